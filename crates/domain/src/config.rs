//! Engine configuration.

use std::future::Future;
use std::time::Duration;

use common::Money;
use store::StoreError;

/// Tunables of the order engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Discount in cents granted per redeemed loyalty point.
    pub redemption_rate_cents: i64,

    /// Points earned per 100 cents of a completed order's total.
    pub accrual_points_per_100_cents: i64,

    /// Upper bound for every storage call.
    pub storage_timeout: Duration,
}

impl EngineConfig {
    /// Discount for redeeming `points`, before capping at the remaining total.
    pub fn points_value(&self, points: i64) -> Money {
        Money::from_cents(points.saturating_mul(self.redemption_rate_cents))
    }

    /// Points earned by completing an order with `total`, rounded down.
    pub fn accrual_for(&self, total: Money) -> i64 {
        let points =
            i128::from(total.cents()) * i128::from(self.accrual_points_per_100_cents) / 100;
        i64::try_from(points).unwrap_or(i64::MAX)
    }

    /// Runs a storage call under [`EngineConfig::storage_timeout`].
    ///
    /// Expiry is reported as [`StoreError::Unavailable`].
    pub async fn bounded<T, F>(&self, call: F) -> store::Result<T>
    where
        F: Future<Output = store::Result<T>>,
    {
        match tokio::time::timeout(self.storage_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "storage call exceeded {:?}",
                self.storage_timeout
            ))),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            redemption_rate_cents: 1,
            accrual_points_per_100_cents: 1,
            storage_timeout: Duration::from_secs(5),
        }
    }
}
