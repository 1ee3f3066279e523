//! flow_dashboard Library
//!
//! Re-exports modules for integration testing and the server binary.

pub mod api;
pub mod config;
pub mod domain;
pub mod engine;
pub mod jobs;
pub mod registry;
pub mod session;
pub mod store;

mod error;

pub use config::Config;
pub use domain::{Address, DomainError, FlowRate, FlowStatus, Recipient, TokenAmount, Wei};
pub use error::{AppError, AppResult};
pub use session::DashboardSession;
