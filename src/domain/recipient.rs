//! Recipient records
//!
//! The client-local cached view of one outgoing flow. Field names on the wire
//! match the storage format written by earlier dashboard sessions.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use super::address::Address;

/// Lifecycle status of a recipient's flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    /// A flow exists on the engine with a nonzero rate
    Active,
    /// The flow was closed but the recipient is kept so it can be resumed
    Paused,
    /// No flow has been observed for this recipient
    #[default]
    None,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Active => "active",
            FlowStatus::Paused => "paused",
            FlowStatus::None => "none",
        }
    }

    /// Whether a user may pause a flow in this status
    pub fn can_pause(&self) -> bool {
        matches!(self, FlowStatus::Active)
    }

    /// Whether a user may resume a flow in this status
    pub fn can_resume(&self) -> bool {
        matches!(self, FlowStatus::Paused | FlowStatus::None)
    }
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked recipient.
///
/// Deserialization is lenient: missing, null or empty amounts become zero
/// and a missing or unknown status becomes [`FlowStatus::None`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub address: Address,

    /// Last-known rate, major units per 30-day month
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub flow_rate: Decimal,

    /// Last-known wrapped token balance
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub balance: Decimal,

    /// Last-known underlying token balance
    #[serde(
        default,
        rename = "euroBalance",
        deserialize_with = "lenient_decimal"
    )]
    pub underlying_balance: Decimal,

    #[serde(default, deserialize_with = "lenient_status")]
    pub status: FlowStatus,
}

impl Recipient {
    /// A freshly added recipient with a flow at `monthly` and unknown balances
    pub fn active(address: Address, monthly: Decimal) -> Self {
        Self {
            address,
            flow_rate: monthly,
            balance: Decimal::ZERO,
            underlying_balance: Decimal::ZERO,
            status: FlowStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == FlowStatus::Active
    }
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = match raw {
        Some(serde_json::Value::String(s)) => Decimal::from_str(s.trim()).ok(),
        Some(serde_json::Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    };
    Ok(parsed.unwrap_or(Decimal::ZERO))
}

fn lenient_status<'de, D>(deserializer: D) -> Result<FlowStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw.as_ref().and_then(|v| v.as_str()) {
        Some("active") => FlowStatus::Active,
        Some("paused") => FlowStatus::Paused,
        _ => FlowStatus::None,
    })
}
