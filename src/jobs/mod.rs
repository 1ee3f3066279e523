//! Polling Jobs
//!
//! Background jobs that keep the dashboard's cached view fresh while a
//! session is connected: one refreshes the account's own balances, the other
//! reconciles the recipient list against the settlement engine.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::domain::Address;
use crate::engine::SettlementEngine;
use crate::registry::{ReconcileReport, RecipientRegistry};
use crate::session::AccountBalances;

// =========================================================================
// Self Balance Job
// =========================================================================

/// Refreshes the connected account's underlying and wrapped balances
pub struct SelfBalanceJob {
    engine: Arc<dyn SettlementEngine>,
    account: Address,
    balances: Arc<RwLock<AccountBalances>>,
    period: Duration,
}

impl SelfBalanceJob {
    pub fn new(
        engine: Arc<dyn SettlementEngine>,
        account: Address,
        balances: Arc<RwLock<AccountBalances>>,
        period: Duration,
    ) -> Self {
        Self {
            engine,
            account,
            balances,
            period,
        }
    }

    /// Start the job in the background.
    /// The first refresh happens one period after start.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::debug!(account = %self.account, period = ?self.period, "Balance poller started");

        let mut ticker = ticker(self.period);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    /// Refresh once; read failures leave zero in place and are logged
    pub async fn run_once(&self) -> AccountBalances {
        let fresh = AccountBalances::fetch(self.engine.as_ref(), &self.account).await;
        *self.balances.write().await = fresh.clone();
        fresh
    }
}

// =========================================================================
// Reconcile Job
// =========================================================================

/// Periodically reconciles the recipient list with engine state
pub struct ReconcileJob {
    registry: Arc<RecipientRegistry>,
    period: Duration,
}

impl ReconcileJob {
    pub fn new(registry: Arc<RecipientRegistry>, period: Duration) -> Self {
        Self { registry, period }
    }

    /// Start the job in the background.
    /// The first cycle happens one period after start.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::debug!(period = ?self.period, "Reconcile poller started");

        let mut ticker = ticker(self.period);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    /// Run one cycle; returns `None` when there is nothing to reconcile
    pub async fn run_once(&self) -> Option<ReconcileReport> {
        if self.registry.is_empty().await {
            return None;
        }

        let report = self.registry.reconcile().await;
        if !report.failed.is_empty() {
            tracing::warn!(
                failed = report.failed.len(),
                checked = report.checked,
                "Reconciliation incomplete"
            );
        }
        Some(report)
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

// =========================================================================
// Poller lifecycle
// =========================================================================

/// Configuration for the polling jobs
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval for own balance refresh (default: 5 seconds)
    pub balance_interval: Duration,
    /// Interval for recipient reconciliation (default: 5 seconds)
    pub reconcile_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::every(Duration::from_secs(5))
    }
}

impl PollerConfig {
    /// Same interval for both jobs
    pub fn every(period: Duration) -> Self {
        Self {
            balance_interval: period,
            reconcile_interval: period,
        }
    }
}

/// Running pollers of one connected session.
///
/// Dropping the handles aborts both tasks.
pub struct PollHandles {
    balance: JoinHandle<()>,
    reconcile: JoinHandle<()>,
}

impl PollHandles {
    /// Spawn both jobs
    pub fn spawn(
        engine: Arc<dyn SettlementEngine>,
        account: Address,
        balances: Arc<RwLock<AccountBalances>>,
        registry: Arc<RecipientRegistry>,
        config: &PollerConfig,
    ) -> Self {
        let balance =
            SelfBalanceJob::new(engine, account, balances, config.balance_interval).start();
        let reconcile = ReconcileJob::new(registry, config.reconcile_interval).start();

        Self { balance, reconcile }
    }

    pub fn is_finished(&self) -> bool {
        self.balance.is_finished() && self.reconcile.is_finished()
    }

    /// Stop both jobs and wait for them to wind down
    pub async fn cancel(mut self) {
        self.balance.abort();
        self.reconcile.abort();
        // Aborted tasks resolve with a cancellation error
        let _ = (&mut self.balance).await;
        let _ = (&mut self.reconcile).await;
        tracing::debug!("Pollers stopped");
    }
}

impl Drop for PollHandles {
    fn drop(&mut self) {
        self.balance.abort();
        self.reconcile.abort();
    }
}

// =========================================================================
// Tests
// =========================================================================
