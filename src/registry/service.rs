//! Recipient Registry
//!
//! Owns the session's recipient list, applies user actions against the
//! settlement engine and reconciles the cached view with engine state.

use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::domain::{Address, AmountError, DomainError, FlowRate, FlowStatus, Recipient, Wei};
use crate::engine::SettlementEngine;
use crate::error::AppResult;
use crate::store::{self, SnapshotStore};

/// What a user action did on the engine side
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowChange {
    /// A new flow was opened at the default rate
    Opened { tx_hash: String },
    /// An existing nonzero flow was found and adopted as-is
    Adopted,
    /// The flow was closed
    Closed { tx_hash: String },
    /// No engine mutation was needed
    Unchanged,
}

impl FlowChange {
    /// Whether the action changed engine-side state
    pub fn mutated_engine(&self) -> bool {
        matches!(self, FlowChange::Opened { .. } | FlowChange::Closed { .. })
    }
}

/// Result of add, pause and resume
#[derive(Debug, Clone, Serialize)]
pub struct RecipientChange {
    pub recipient: Recipient,
    pub change: FlowChange,
}

/// A status change made by reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub address: String,
    pub from: FlowStatus,
    pub to: FlowStatus,
}

/// Summary of one reconciliation cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Recipients queried this cycle
    pub checked: usize,
    /// Records whose cached values changed
    pub updated: usize,
    /// Recipients whose queries failed; their records were left as they were
    pub failed: Vec<String>,
    pub transitions: Vec<StatusTransition>,
}

/// Engine-reported state of one recipient
#[derive(Debug, Clone)]
struct Observation {
    rate: FlowRate,
    monthly: Decimal,
    balance: Decimal,
    underlying_balance: Decimal,
}

/// Client-local recipient list backed by a snapshot store
pub struct RecipientRegistry {
    engine: Arc<dyn SettlementEngine>,
    store: Arc<dyn SnapshotStore>,
    sender: Address,
    default_monthly: Decimal,
    default_rate: FlowRate,
    recipients: RwLock<Vec<Recipient>>,
    /// Serializes user actions; reconciliation does not take it
    mutations: Mutex<()>,
}

impl RecipientRegistry {
    /// Rehydrate the registry from storage.
    ///
    /// A payload that cannot be read as a recipient list is discarded and the
    /// registry starts empty.
    pub async fn load(
        engine: Arc<dyn SettlementEngine>,
        store: Arc<dyn SnapshotStore>,
        sender: Address,
        default_monthly: Decimal,
    ) -> AppResult<Self> {
        let default_rate = FlowRate::from_monthly(default_monthly).map_err(DomainError::from)?;
        // a rate that truncates to zero would make every open revert
        if default_rate.is_zero() {
            return Err(DomainError::from(AmountError::NotPositive(default_monthly)).into());
        }

        let recipients = match store.read().await? {
            None => Vec::new(),
            Some(payload) => match store::decode(&payload) {
                Ok(recipients) => recipients,
                Err(e) => {
                    tracing::warn!(
                        storage_key = store.storage_key(),
                        error = %e,
                        "Stored recipient list is unreadable, clearing it"
                    );
                    store.clear().await?;
                    Vec::new()
                }
            },
        };

        tracing::info!(
            storage_key = store.storage_key(),
            count = recipients.len(),
            "Recipients loaded"
        );

        Ok(Self {
            engine,
            store,
            sender,
            default_monthly,
            default_rate,
            recipients: RwLock::new(recipients),
            mutations: Mutex::new(()),
        })
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn default_monthly(&self) -> Decimal {
        self.default_monthly
    }

    pub fn default_rate(&self) -> FlowRate {
        self.default_rate
    }

    pub async fn list(&self) -> Vec<Recipient> {
        self.recipients.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.recipients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.recipients.read().await.is_empty()
    }

    /// Look up a recipient, ignoring address case
    pub async fn get(&self, address: &str) -> Option<Recipient> {
        let address = address.trim();
        self.recipients
            .read()
            .await
            .iter()
            .find(|r| r.address.as_str().eq_ignore_ascii_case(address))
            .cloned()
    }

    /// Sum of the monthly rates of all active recipients.
    ///
    /// Saturates at `Decimal::MAX` if stored rates overflow the sum.
    pub async fn active_monthly_total(&self) -> Decimal {
        let recipients = self.recipients.read().await;
        let total = recipients
            .iter()
            .filter(|r| r.is_active())
            .try_fold(Decimal::ZERO, |sum, r| sum.checked_add(r.flow_rate));

        total.unwrap_or_else(|| {
            tracing::warn!(
                count = recipients.len(),
                "Monthly total overflows, reporting the maximum"
            );
            Decimal::MAX
        })
    }

    // =========================================================================
    // User actions
    // =========================================================================

    /// Start tracking `input`.
    ///
    /// An existing nonzero flow is adopted at its current rate; otherwise a
    /// new flow is opened at the default rate.
    pub async fn add(&self, input: &str) -> AppResult<RecipientChange> {
        let address = Address::parse(input).map_err(DomainError::from)?;
        if address.same_account(&self.sender) {
            return Err(DomainError::SelfFlow(address.to_string()).into());
        }

        let _guard = self.mutations.lock().await;
        if self.get(address.as_str()).await.is_some() {
            return Err(DomainError::DuplicateRecipient(address.to_string()).into());
        }

        let existing = self.engine.query_flow(&self.sender, &address).await?;
        let (recipient, change) = match existing.filter(|flow| flow.is_flowing()) {
            Some(flow) => {
                let observed = self.observe_with_rate(&address, flow.rate).await?;
                let recipient = Recipient {
                    address,
                    flow_rate: observed.monthly,
                    balance: observed.balance,
                    underlying_balance: observed.underlying_balance,
                    status: FlowStatus::Active,
                };
                (recipient, FlowChange::Adopted)
            }
            None => {
                let receipt = self
                    .engine
                    .open_flow(&self.sender, &address, self.default_rate)
                    .await?;
                (
                    Recipient::active(address, self.default_monthly),
                    FlowChange::Opened {
                        tx_hash: receipt.tx_hash,
                    },
                )
            }
        };

        let mut recipients = self.recipients.write().await;
        let previous = recipients.clone();
        recipients.push(recipient.clone());
        self.commit(&mut recipients, previous, &change).await?;

        tracing::info!(
            recipient = %recipient.address,
            monthly = %recipient.flow_rate,
            change = ?change,
            "Recipient added"
        );

        Ok(RecipientChange { recipient, change })
    }

    /// Close an active flow and keep the recipient as paused
    pub async fn pause(&self, address: &str) -> AppResult<RecipientChange> {
        let _guard = self.mutations.lock().await;
        let current = self.find(address).await?;
        if !current.status.can_pause() {
            return Err(
                DomainError::invalid_status(current.address.as_str(), current.status, "pause")
                    .into(),
            );
        }

        let receipt = self.engine.close_flow(&self.sender, &current.address).await?;
        let change = FlowChange::Closed {
            tx_hash: receipt.tx_hash,
        };

        let recipient = self
            .update(&current.address, &change, |r| {
                r.status = FlowStatus::Paused;
                r.flow_rate = Decimal::ZERO;
            })
            .await?;

        tracing::info!(recipient = %recipient.address, change = ?change, "Flow paused");

        Ok(RecipientChange { recipient, change })
    }

    /// Bring a paused (or never started) recipient back to active.
    ///
    /// An existing nonzero flow is adopted at its current rate; otherwise a
    /// new flow is opened at the default rate.
    pub async fn resume(&self, address: &str) -> AppResult<RecipientChange> {
        let _guard = self.mutations.lock().await;
        let current = self.find(address).await?;
        if !current.status.can_resume() {
            return Err(
                DomainError::invalid_status(current.address.as_str(), current.status, "resume")
                    .into(),
            );
        }

        let existing = self.engine.query_flow(&self.sender, &current.address).await?;
        let (monthly, change) = match existing.filter(|flow| flow.is_flowing()) {
            Some(flow) => (monthly_of(flow.rate)?, FlowChange::Adopted),
            None => {
                let receipt = self
                    .engine
                    .open_flow(&self.sender, &current.address, self.default_rate)
                    .await?;
                (
                    self.default_monthly,
                    FlowChange::Opened {
                        tx_hash: receipt.tx_hash,
                    },
                )
            }
        };

        let recipient = self
            .update(&current.address, &change, |r| {
                r.status = FlowStatus::Active;
                r.flow_rate = monthly;
            })
            .await?;

        tracing::info!(recipient = %recipient.address, change = ?change, "Flow resumed");

        Ok(RecipientChange { recipient, change })
    }

    /// Stop tracking a recipient, closing its flow first if one is running
    pub async fn remove(&self, address: &str) -> AppResult<FlowChange> {
        let _guard = self.mutations.lock().await;
        let current = self.find(address).await?;

        let existing = self.engine.query_flow(&self.sender, &current.address).await?;
        let change = match existing.filter(|flow| flow.is_flowing()) {
            Some(_) => {
                let receipt = self.engine.close_flow(&self.sender, &current.address).await?;
                FlowChange::Closed {
                    tx_hash: receipt.tx_hash,
                }
            }
            None => FlowChange::Unchanged,
        };

        let mut recipients = self.recipients.write().await;
        let previous = recipients.clone();
        recipients.retain(|r| !r.address.same_account(&current.address));
        self.commit(&mut recipients, previous, &change).await?;

        tracing::info!(recipient = %current.address, change = ?change, "Recipient removed");
        Ok(change)
    }

    /// Forget every recipient without touching engine-side flows
    pub async fn clear(&self) -> AppResult<usize> {
        let _guard = self.mutations.lock().await;
        let mut recipients = self.recipients.write().await;
        let removed = recipients.len();
        let previous = std::mem::take(&mut *recipients);
        self.commit(&mut recipients, previous, &FlowChange::Unchanged).await?;

        tracing::info!(removed = removed, "Recipient list cleared");
        Ok(removed)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Sync every cached record with engine ground truth.
    ///
    /// A nonzero engine rate makes the record `active`; a zero rate turns an
    /// `active` record into `paused` and leaves `paused`/`none` alone. A
    /// recipient whose queries fail keeps its record unchanged for this cycle.
    ///
    /// This runs concurrently with user actions and does not wait for them.
    /// The last reconciliation wins: a status set by a user action can be
    /// overwritten by a cycle that observed the engine before that action
    /// landed, and is corrected again by the next cycle. Staleness is
    /// therefore bounded by the polling interval.
    pub async fn reconcile(&self) -> ReconcileReport {
        let snapshot = self.list().await;
        let mut report = ReconcileReport {
            checked: snapshot.len(),
            ..ReconcileReport::default()
        };
        if snapshot.is_empty() {
            return report;
        }

        let observations = join_all(snapshot.iter().map(|r| self.observe(&r.address))).await;

        let mut recipients = self.recipients.write().await;
        for (seen, observation) in snapshot.iter().zip(observations) {
            let observation = match observation {
                Ok(observation) => observation,
                Err(e) => {
                    tracing::warn!(
                        recipient = %seen.address,
                        error = %e,
                        "Reconciliation query failed, keeping cached record"
                    );
                    report.failed.push(seen.address.to_string());
                    continue;
                }
            };

            // removed while the queries were in flight
            let Some(record) = recipients
                .iter_mut()
                .find(|r| r.address.same_account(&seen.address))
            else {
                continue;
            };

            let before = record.clone();
            apply_observation(record, &observation);

            if *record != before {
                report.updated += 1;
            }
            if record.status != before.status {
                report.transitions.push(StatusTransition {
                    address: record.address.to_string(),
                    from: before.status,
                    to: record.status,
                });
            }
        }

        if report.updated > 0 {
            if let Err(e) = self.persist(&recipients).await {
                tracing::error!(error = %e, "Failed to persist reconciled recipients");
            }
        }

        for transition in &report.transitions {
            tracing::info!(
                recipient = %transition.address,
                from = %transition.from,
                to = %transition.to,
                "Flow status reconciled"
            );
        }
        tracing::debug!(
            checked = report.checked,
            updated = report.updated,
            failed = report.failed.len(),
            "Reconciliation cycle complete"
        );

        report
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn find(&self, address: &str) -> AppResult<Recipient> {
        self.get(address)
            .await
            .ok_or_else(|| DomainError::RecipientNotFound(address.trim().to_string()).into())
    }

    async fn update<F>(
        &self,
        address: &Address,
        change: &FlowChange,
        apply: F,
    ) -> AppResult<Recipient>
    where
        F: FnOnce(&mut Recipient),
    {
        let mut recipients = self.recipients.write().await;
        let previous = recipients.clone();
        let record = recipients
            .iter_mut()
            .find(|r| r.address.same_account(address))
            .ok_or_else(|| DomainError::RecipientNotFound(address.to_string()))?;

        apply(record);
        let updated = record.clone();
        self.commit(&mut recipients, previous, change).await?;
        Ok(updated)
    }

    /// Write the list after a user action.
    ///
    /// Once the engine has been mutated the in-memory list must follow it, so a
    /// storage failure is logged and the action still succeeds. Without an
    /// engine mutation the previous list is restored and the error returned.
    async fn commit(
        &self,
        recipients: &mut Vec<Recipient>,
        previous: Vec<Recipient>,
        change: &FlowChange,
    ) -> AppResult<()> {
        match self.persist(recipients).await {
            Ok(()) => Ok(()),
            Err(e) if change.mutated_engine() => {
                tracing::error!(
                    error = %e,
                    change = ?change,
                    "Failed to persist recipients, keeping engine-backed change"
                );
                Ok(())
            }
            Err(e) => {
                *recipients = previous;
                Err(e)
            }
        }
    }

    async fn persist(&self, recipients: &[Recipient]) -> AppResult<()> {
        let payload = store::encode(recipients)?;
        self.store.write(&payload).await?;
        Ok(())
    }

    async fn observe(&self, address: &Address) -> AppResult<Observation> {
        let rate = self
            .engine
            .query_flow(&self.sender, address)
            .await?
            .map(|flow| flow.rate)
            .unwrap_or(FlowRate::ZERO);
        self.observe_with_rate(address, rate).await
    }

    async fn observe_with_rate(&self, address: &Address, rate: FlowRate) -> AppResult<Observation> {
        let balance = self.engine.query_balance(address).await?;
        let underlying = self.engine.underlying_balance(address).await?;

        Ok(Observation {
            rate,
            monthly: monthly_of(rate)?,
            balance: major(balance.available)?,
            underlying_balance: major(underlying)?,
        })
    }
}

fn apply_observation(record: &mut Recipient, observation: &Observation) {
    if observation.rate.is_zero() {
        if record.status == FlowStatus::Active {
            record.status = FlowStatus::Paused;
        }
        record.flow_rate = Decimal::ZERO;
    } else {
        record.status = FlowStatus::Active;
        record.flow_rate = observation.monthly;
    }
    record.balance = observation.balance;
    record.underlying_balance = observation.underlying_balance;
}

fn monthly_of(rate: FlowRate) -> AppResult<Decimal> {
    Ok(rate.to_monthly().map_err(DomainError::from)?)
}

fn major(amount: Wei) -> AppResult<Decimal> {
    Ok(amount.to_major().map_err(DomainError::from)?)
}
