//! Persistence for orders, coupon redemptions, loyalty balances and the
//! order audit trail.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod unit_of_work;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{CatalogStore, OrderStore, OrderStoreExt};
pub use unit_of_work::{Applied, Mutation, UnitOfWork, check_coupon_use, check_points};

/// Tier given to loyalty accounts opened implicitly by a credit.
pub const DEFAULT_TIER: &str = "bronze";
