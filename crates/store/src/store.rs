use async_trait::async_trait;
use common::{
    Coupon, CouponUsage, CustomerId, Establishment, EstablishmentFields, EstablishmentId,
    LoyaltyAccount, LoyaltyTransaction, Order, OrderEvent, OrderId, OrderItem, Product, ProductId,
};

use crate::{Applied, Result, UnitOfWork};

/// Storage capability consumed by the order engine.
///
/// Reads are plain snapshots; every write goes through [`OrderStore::apply`],
/// which is the only way to change orders, redemptions, loyalty balances or
/// the audit trail. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Looks up catalog entries. Unknown ids are simply absent from the result.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Retrieves a coupon definition by code.
    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>>;

    /// Counts redemptions of `code` overall, by `customer_id`, and on `order_id`.
    async fn get_coupon_usage(
        &self,
        code: &str,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<CouponUsage>;

    /// Retrieves a customer's loyalty account, if one was opened.
    async fn get_loyalty_account(&self, customer_id: CustomerId)
    -> Result<Option<LoyaltyAccount>>;

    /// Retrieves a customer's points ledger, oldest first.
    async fn get_loyalty_transactions(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<LoyaltyTransaction>>;

    /// Retrieves an order row.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Retrieves an order's lines in request order.
    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Retrieves an order's audit trail ordered by (timestamp, sequence).
    async fn get_order_events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>>;

    /// Applies a unit of work atomically: either every mutation is written
    /// or none is.
    async fn apply(&self, unit: UnitOfWork) -> Result<Applied>;
}

/// Extension trait providing convenience reads over [`OrderStore`].
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Loads an order together with its lines.
    async fn load_order(&self, order_id: OrderId) -> Result<Option<(Order, Vec<OrderItem>)>> {
        match self.get_order(order_id).await? {
            Some(order) => {
                let items = self.get_order_items(order_id).await?;
                Ok(Some((order, items)))
            }
            None => Ok(None),
        }
    }

    /// Returns the customer's balance, zero when no account exists.
    async fn points_balance(&self, customer_id: CustomerId) -> Result<i64> {
        Ok(self
            .get_loyalty_account(customer_id)
            .await?
            .map_or(0, |account| account.points_balance))
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}

/// Record management for the data the order engine reads.
///
/// These are plain CRUD operations with no ledger semantics.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create_establishment(&self, fields: EstablishmentFields) -> Result<Establishment>;

    async fn list_establishments(&self) -> Result<Vec<Establishment>>;

    async fn get_establishment(&self, id: EstablishmentId) -> Result<Option<Establishment>>;

    /// Returns `None` when the establishment does not exist.
    async fn update_establishment(
        &self,
        id: EstablishmentId,
        fields: EstablishmentFields,
    ) -> Result<Option<Establishment>>;

    /// Returns false when the establishment does not exist.
    async fn delete_establishment(&self, id: EstablishmentId) -> Result<bool>;

    /// Inserts or replaces a product.
    async fn upsert_product(&self, product: Product) -> Result<()>;

    /// Inserts or replaces a coupon definition.
    async fn upsert_coupon(&self, coupon: Coupon) -> Result<()>;

    /// Opens a loyalty account with an initial balance, or returns the
    /// existing one unchanged.
    async fn open_loyalty_account(
        &self,
        customer_id: CustomerId,
        tier: &str,
        initial_points: i64,
    ) -> Result<LoyaltyAccount>;
}
