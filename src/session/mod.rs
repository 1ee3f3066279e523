//! Dashboard Session module
//!
//! Connection bootstrap, the account's own wallet actions and the loading
//! gate that serializes every mutating action.

mod service;

#[cfg(test)]
mod tests;

pub use service::DashboardSession;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::Config;
use crate::domain::{Address, Recipient, TokenAmount, Wei};
use crate::engine::SettlementEngine;
use crate::jobs::PollerConfig;

/// Static settings of a dashboard session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub account: Address,
    pub underlying_token: Address,
    pub wrapped_token: Address,
    pub default_monthly_amount: Decimal,
    pub partial_unwrap_percent: u32,
    pub signer_accounts: Vec<Address>,
    pub pollers: PollerConfig,
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            account: config.account.clone(),
            underlying_token: config.underlying_token.clone(),
            wrapped_token: config.wrapped_token.clone(),
            default_monthly_amount: config.default_monthly_amount,
            partial_unwrap_percent: config.partial_unwrap_percent,
            signer_accounts: config.signer_accounts.clone(),
            pollers: PollerConfig::every(config.poll_interval),
        }
    }
}

/// The connected account's own balances, in major units
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountBalances {
    pub underlying: Decimal,
    /// Available wrapped balance
    pub wrapped: Decimal,
    /// Wrapped tokens locked as flow deposits
    pub deposit: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AccountBalances {
    /// Read both balances from the engine.
    ///
    /// A failed read is logged and reported as zero.
    pub async fn fetch(engine: &dyn SettlementEngine, account: &Address) -> Self {
        let underlying = match engine.underlying_balance(account).await {
            Ok(amount) => major_or_zero(amount, "underlying"),
            Err(e) => {
                tracing::warn!(account = %account, error = %e, "Failed to read underlying balance");
                Decimal::ZERO
            }
        };

        let (wrapped, deposit) = match engine.query_balance(account).await {
            Ok(balance) => (
                major_or_zero(balance.available, "wrapped"),
                major_or_zero(balance.deposit, "deposit"),
            ),
            Err(e) => {
                tracing::warn!(account = %account, error = %e, "Failed to read wrapped balance");
                (Decimal::ZERO, Decimal::ZERO)
            }
        };

        Self {
            underlying,
            wrapped,
            deposit,
            updated_at: Some(Utc::now()),
        }
    }
}

fn major_or_zero(amount: Wei, kind: &'static str) -> Decimal {
    amount.to_major().unwrap_or_else(|e| {
        tracing::warn!(kind = kind, amount = %amount, error = %e, "Balance out of range");
        Decimal::ZERO
    })
}

/// Everything the dashboard page shows
#[derive(Debug, Clone, Serialize)]
pub struct SessionOverview {
    pub connected: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub account: Address,
    pub chain_id: u64,
    pub balances: AccountBalances,
    pub recipients: Vec<Recipient>,
    /// Whether any recipient has an active flow
    pub streaming: bool,
    /// Monthly outflow across active recipients
    pub total_monthly_outflow: Decimal,
    pub default_monthly_amount: Decimal,
}

/// Outcome of a wrap or unwrap on the session's own account
#[derive(Debug, Clone, Serialize)]
pub struct WalletReceipt {
    pub tx_hash: String,
    pub amount: TokenAmount,
    /// Set when an allowance approval had to be sent first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_tx_hash: Option<String>,
    pub balances: AccountBalances,
}

/// Outcome of a partial unwrap on a recipient's account
#[derive(Debug, Clone, Serialize)]
pub struct RecipientUnwrap {
    pub recipient: Address,
    pub amount: Decimal,
    pub percent: u32,
    pub tx_hash: String,
}
