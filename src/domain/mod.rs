//! Domain module
//!
//! Core domain types: addresses, amounts, flow rates and recipient records.

pub mod address;
pub mod amount;
pub mod error;
pub mod flow_rate;
pub mod recipient;

pub use address::{Address, AddressError};
pub use amount::{AmountError, TokenAmount, Wei, TOKEN_DECIMALS};
pub use error::{DomainError, ErrorClass};
pub use flow_rate::{flow_rate_to_monthly, monthly_to_flow_rate, FlowRate, SECONDS_PER_MONTH};
pub use recipient::{FlowStatus, Recipient};
