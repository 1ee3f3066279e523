//! Flow rates
//!
//! A flow rate is wei per second. The dashboard shows and stores rates as a
//! monthly amount in major units, using a fixed 30-day month.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::amount::{AmountError, Wei};

/// Seconds in the fixed 30-day month used for every conversion
pub const SECONDS_PER_MONTH: i128 = 30 * 24 * 60 * 60;

/// Per-second payment rate in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowRate(Wei);

impl FlowRate {
    pub const ZERO: FlowRate = FlowRate(Wei::ZERO);

    pub const fn per_second(wei: Wei) -> Self {
        Self(wei)
    }

    pub fn wei_per_second(&self) -> Wei {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Rate that streams `monthly` major units per 30-day month.
    ///
    /// Integer division truncates toward zero, so converting back with
    /// [`FlowRate::to_monthly`] never yields more than the input.
    pub fn from_monthly(monthly: Decimal) -> Result<Self, AmountError> {
        let total = Wei::from_major(monthly)?;
        Ok(Self(Wei::new(total.value() / SECONDS_PER_MONTH)))
    }

    /// Monthly amount in major units streamed at this rate.
    pub fn to_monthly(&self) -> Result<Decimal, AmountError> {
        let total = self
            .0
            .value()
            .checked_mul(SECONDS_PER_MONTH)
            .ok_or(AmountError::Overflow)?;
        Wei::new(total).to_major()
    }

    /// Amount streamed over `seconds`
    pub fn over(&self, seconds: i64) -> Option<Wei> {
        self.0.value().checked_mul(i128::from(seconds)).map(Wei::new)
    }
}

impl fmt::Display for FlowRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} wei/s", self.0)
    }
}

/// Monthly amount (major units) to a per-second rate
pub fn monthly_to_flow_rate(monthly: Decimal) -> Result<FlowRate, AmountError> {
    FlowRate::from_monthly(monthly)
}

/// Per-second rate to a monthly amount (major units)
pub fn flow_rate_to_monthly(rate: FlowRate) -> Result<Decimal, AmountError> {
    rate.to_monthly()
}
