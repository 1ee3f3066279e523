//! Recipient Registry module
//!
//! The recipient list, the user actions that mutate it and the reconciler
//! that keeps it in line with the settlement engine.

mod service;


pub use service::{
    FlowChange, ReconcileReport, RecipientChange, RecipientRegistry, StatusTransition,
};
