//! Order processing engine.
//!
//! This crate provides:
//! - `OrderBuilder` validating and pricing proposed orders
//! - the order status state machine
//! - the ledger planner that turns commits and transitions into atomic
//!   units of work
//! - the audit trail payloads and `OrderHistory` replay
//! - `OrderService`, the facade tying them to an injected store

pub mod audit;
pub mod builder;
pub mod config;
pub mod error;
pub mod ledger;
pub mod pricing;
pub mod service;
pub mod state_machine;

pub use audit::{AuditEvent, OrderHistory, StatusChange, TimelineEntry};
pub use builder::{ItemRequest, OrderBuilder, OrderDraft, OrderRequest};
pub use config::EngineConfig;
pub use error::{OrderError, Result};
pub use pricing::PriceBreakdown;
pub use service::OrderService;
pub use state_machine::Transition;
