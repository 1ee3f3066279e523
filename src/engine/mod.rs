//! Settlement engine client
//!
//! The streaming protocol lives outside this crate. Everything the dashboard
//! needs from it is expressed by [`SettlementEngine`]; one instance is built
//! per session and shared as `Arc<dyn SettlementEngine>`.

mod local;

pub use local::{LocalChain, LocalChainConfig, DEPOSIT_BUFFER_SECS};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Address, FlowRate, Wei};

pub type EngineResult<T> = Result<T, EngineError>;

/// An existing flow between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowInfo {
    pub rate: FlowRate,
    pub deposit: Wei,
    pub updated_at: DateTime<Utc>,
}

impl FlowInfo {
    pub fn is_flowing(&self) -> bool {
        !self.rate.is_zero()
    }
}

/// Wrapped token balance at the time of the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeBalance {
    /// Spendable balance (deposits excluded)
    pub available: Wei,
    /// Deposit locked by the account's outgoing flows
    pub deposit: Wei,
}

/// A confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub confirmed_at: DateTime<Utc>,
}

/// Failures reported by the settlement engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The transaction could not be submitted
    #[error("Transaction submission failed: {0}")]
    Submission(String),

    /// The transaction was submitted but not confirmed
    #[error("Transaction {tx_hash} failed to confirm: {reason}")]
    Confirmation { tx_hash: String, reason: String },

    /// The chain rejected the operation
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// A read-only query failed
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Engine unavailable: {0}")]
    Unavailable(String),
}

/// Operations the dashboard consumes from the settlement engine.
///
/// Every mutating call covers both phases of an on-chain submission: it
/// returns once the transaction is confirmed or has failed.
#[async_trait]
pub trait SettlementEngine: Send + Sync {
    /// Network the engine is bound to
    fn chain_id(&self) -> u64;

    /// Whether code exists at `contract`
    async fn is_deployed(&self, contract: &Address) -> EngineResult<bool>;

    async fn open_flow(
        &self,
        sender: &Address,
        receiver: &Address,
        rate: FlowRate,
    ) -> EngineResult<TxReceipt>;

    async fn close_flow(&self, sender: &Address, receiver: &Address) -> EngineResult<TxReceipt>;

    /// Current flow from `sender` to `receiver`, if one exists
    async fn query_flow(&self, sender: &Address, receiver: &Address)
        -> EngineResult<Option<FlowInfo>>;

    /// Realtime wrapped token balance
    async fn query_balance(&self, account: &Address) -> EngineResult<RealtimeBalance>;

    /// Underlying token balance
    async fn underlying_balance(&self, account: &Address) -> EngineResult<Wei>;

    /// Underlying tokens `owner` allows the wrapped token to pull
    async fn allowance(&self, owner: &Address) -> EngineResult<Wei>;

    async fn approve(&self, owner: &Address, amount: Wei) -> EngineResult<TxReceipt>;

    /// Convert underlying tokens of `account` into wrapped tokens
    async fn wrap(&self, account: &Address, amount: Wei) -> EngineResult<TxReceipt>;

    /// Convert wrapped tokens of `account` back into underlying tokens
    async fn unwrap(&self, account: &Address, amount: Wei) -> EngineResult<TxReceipt>;
}
