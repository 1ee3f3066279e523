//! Dashboard Session
//!
//! Owns the engine handle, the recipient registry, the cached balances and
//! the pollers of one connected account.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::domain::{Address, DomainError, Recipient, TokenAmount, Wei};
use crate::engine::SettlementEngine;
use crate::error::AppResult;
use crate::jobs::PollHandles;
use crate::registry::{FlowChange, ReconcileReport, RecipientChange, RecipientRegistry};
use crate::store::SnapshotStore;

use super::{AccountBalances, RecipientUnwrap, SessionConfig, SessionOverview, WalletReceipt};

struct Connection {
    connected_at: DateTime<Utc>,
    pollers: PollHandles,
}

/// One dashboard session
pub struct DashboardSession {
    engine: Arc<dyn SettlementEngine>,
    registry: Arc<RecipientRegistry>,
    config: SessionConfig,
    balances: Arc<RwLock<AccountBalances>>,
    connection: Mutex<Option<Connection>>,
    /// Loading gate: held by every mutating action
    gate: Mutex<()>,
}

impl DashboardSession {
    /// Build a disconnected session, rehydrating the recipient list from `store`
    pub async fn open(
        engine: Arc<dyn SettlementEngine>,
        store: Arc<dyn SnapshotStore>,
        config: SessionConfig,
    ) -> AppResult<Self> {
        let registry = RecipientRegistry::load(
            engine.clone(),
            store,
            config.account.clone(),
            config.default_monthly_amount,
        )
        .await?;

        Ok(Self {
            engine,
            registry: Arc::new(registry),
            config,
            balances: Arc::new(RwLock::new(AccountBalances::default())),
            connection: Mutex::new(None),
            gate: Mutex::new(()),
        })
    }

    pub fn account(&self) -> &Address {
        &self.config.account
    }

    pub fn registry(&self) -> &RecipientRegistry {
        &self.registry
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    pub async fn balances(&self) -> AccountBalances {
        self.balances.read().await.clone()
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Verify the token contracts, load balances and start polling.
    ///
    /// Connecting again restarts the pollers.
    pub async fn connect(&self) -> AppResult<SessionOverview> {
        let _gate = self.begin()?;

        let contracts = [
            ("underlying token", &self.config.underlying_token),
            ("wrapped token", &self.config.wrapped_token),
        ];
        for (name, contract) in contracts {
            if !self.engine.is_deployed(contract).await? {
                return Err(DomainError::ContractNotDeployed {
                    name,
                    address: contract.to_string(),
                }
                .into());
            }
        }

        self.refresh_balances().await;

        let pollers = PollHandles::spawn(
            self.engine.clone(),
            self.config.account.clone(),
            self.balances.clone(),
            self.registry.clone(),
            &self.config.pollers,
        );
        let previous = self.connection.lock().await.replace(Connection {
            connected_at: Utc::now(),
            pollers,
        });
        if let Some(previous) = previous {
            previous.pollers.cancel().await;
            tracing::debug!("Replaced pollers of previous connection");
        }

        tracing::info!(
            account = %self.config.account,
            chain_id = self.engine.chain_id(),
            "Session connected"
        );

        Ok(self.overview().await)
    }

    /// Stop polling and forget connection state. Returns whether the
    /// session was connected.
    pub async fn disconnect(&self) -> bool {
        let Some(connection) = self.connection.lock().await.take() else {
            return false;
        };

        connection.pollers.cancel().await;
        *self.balances.write().await = AccountBalances::default();

        tracing::info!(account = %self.config.account, "Session disconnected");
        true
    }

    pub async fn overview(&self) -> SessionOverview {
        let connected_at = self
            .connection
            .lock()
            .await
            .as_ref()
            .map(|c| c.connected_at);
        let recipients = self.registry.list().await;

        SessionOverview {
            connected: connected_at.is_some(),
            connected_at,
            account: self.config.account.clone(),
            chain_id: self.engine.chain_id(),
            balances: self.balances().await,
            streaming: recipients.iter().any(Recipient::is_active),
            total_monthly_outflow: self.registry.active_monthly_total().await,
            default_monthly_amount: self.config.default_monthly_amount,
            recipients,
        }
    }

    // =========================================================================
    // Wallet actions
    // =========================================================================

    /// Convert underlying tokens into wrapped tokens.
    ///
    /// Approves the maximum allowance first when the current one is too low.
    pub async fn wrap(&self, amount: &str) -> AppResult<WalletReceipt> {
        let _gate = self.begin()?;
        self.require_connected().await?;

        let amount = TokenAmount::from_str(amount).map_err(DomainError::from)?;
        let wei = amount.to_wei();
        let account = &self.config.account;

        let available = self.engine.underlying_balance(account).await?;
        if available < wei {
            return Err(DomainError::insufficient_balance(
                amount.value(),
                available.to_major().map_err(DomainError::from)?,
            )
            .into());
        }

        let approval_tx_hash = if self.engine.allowance(account).await? < wei {
            let receipt = self.engine.approve(account, Wei::MAX).await?;
            tracing::info!(account = %account, tx_hash = %receipt.tx_hash, "Allowance approved");
            Some(receipt.tx_hash)
        } else {
            None
        };

        let receipt = self.engine.wrap(account, wei).await?;
        let balances = self.refresh_balances().await;

        tracing::info!(account = %account, amount = %amount, tx_hash = %receipt.tx_hash, "Tokens wrapped");

        Ok(WalletReceipt {
            tx_hash: receipt.tx_hash,
            amount,
            approval_tx_hash,
            balances,
        })
    }

    /// Convert wrapped tokens back into underlying tokens
    pub async fn unwrap(&self, amount: &str) -> AppResult<WalletReceipt> {
        let _gate = self.begin()?;
        self.require_connected().await?;

        let amount = TokenAmount::from_str(amount).map_err(DomainError::from)?;
        let wei = amount.to_wei();
        let account = &self.config.account;

        let balance = self.engine.query_balance(account).await?;
        if balance.available < wei {
            return Err(DomainError::insufficient_balance(
                amount.value(),
                balance.available.to_major().map_err(DomainError::from)?,
            )
            .into());
        }

        let receipt = self.engine.unwrap(account, wei).await?;
        let balances = self.refresh_balances().await;

        tracing::info!(account = %account, amount = %amount, tx_hash = %receipt.tx_hash, "Tokens unwrapped");

        Ok(WalletReceipt {
            tx_hash: receipt.tx_hash,
            amount,
            approval_tx_hash: None,
            balances,
        })
    }

    /// Unwrap a share of a recipient's available wrapped balance on their
    /// behalf. Only accounts in the signer set are accepted.
    pub async fn unwrap_for_recipient(&self, address: &str) -> AppResult<RecipientUnwrap> {
        let _gate = self.begin()?;
        self.require_connected().await?;

        let recipient = Address::parse(address).map_err(DomainError::from)?;
        if !self
            .config
            .signer_accounts
            .iter()
            .any(|signer| signer.same_account(&recipient))
        {
            return Err(DomainError::UnknownSigner(recipient.to_string()).into());
        }

        let balance = self.engine.query_balance(&recipient).await?;
        if !balance.available.is_positive() {
            return Err(DomainError::NothingToUnwrap(recipient.to_string()).into());
        }

        let percent = self.config.partial_unwrap_percent;
        let amount = balance
            .available
            .percent(percent)
            .filter(|amount| amount.is_positive())
            .ok_or_else(|| DomainError::NothingToUnwrap(recipient.to_string()))?;

        let receipt = self.engine.unwrap(&recipient, amount).await?;

        tracing::info!(
            recipient = %recipient,
            amount = %amount,
            percent = percent,
            tx_hash = %receipt.tx_hash,
            "Recipient balance partially unwrapped"
        );

        Ok(RecipientUnwrap {
            amount: amount.to_major().map_err(DomainError::from)?,
            recipient,
            percent,
            tx_hash: receipt.tx_hash,
        })
    }

    // =========================================================================
    // Recipient actions
    // =========================================================================

    pub async fn recipients(&self) -> Vec<Recipient> {
        self.registry.list().await
    }

    pub async fn add_recipient(&self, address: &str) -> AppResult<RecipientChange> {
        let _gate = self.begin()?;
        self.require_connected().await?;
        self.registry.add(address).await
    }

    pub async fn pause(&self, address: &str) -> AppResult<RecipientChange> {
        let _gate = self.begin()?;
        self.require_connected().await?;
        self.registry.pause(address).await
    }

    pub async fn resume(&self, address: &str) -> AppResult<RecipientChange> {
        let _gate = self.begin()?;
        self.require_connected().await?;
        self.registry.resume(address).await
    }

    pub async fn remove(&self, address: &str) -> AppResult<FlowChange> {
        let _gate = self.begin()?;
        self.require_connected().await?;
        self.registry.remove(address).await
    }

    /// Forget all recipients; local only, so no connection is needed
    pub async fn clear_recipients(&self) -> AppResult<usize> {
        let _gate = self.begin()?;
        self.registry.clear().await
    }

    /// Run one reconciliation cycle now, outside the poller schedule
    pub async fn reconcile_now(&self) -> AppResult<ReconcileReport> {
        self.require_connected().await?;
        Ok(self.registry.reconcile().await)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn begin(&self) -> AppResult<MutexGuard<'_, ()>> {
        self.gate.try_lock().map_err(|_| {
            tracing::debug!("Action rejected, another one is in progress");
            DomainError::Busy.into()
        })
    }

    async fn require_connected(&self) -> AppResult<()> {
        if self.is_connected().await {
            Ok(())
        } else {
            Err(DomainError::NotConnected.into())
        }
    }

    async fn refresh_balances(&self) -> AccountBalances {
        let fresh = AccountBalances::fetch(self.engine.as_ref(), &self.config.account).await;
        *self.balances.write().await = fresh.clone();
        fresh
    }
}
