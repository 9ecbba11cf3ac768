use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    Coupon, CouponRedemption, CouponUsage, CustomerId, Establishment, EstablishmentFields,
    EstablishmentId, LoyaltyAccount, LoyaltyReason, LoyaltyTransaction, Order, OrderEvent,
    OrderId, OrderItem, Product, ProductId,
};
use tokio::sync::RwLock;

use crate::{
    Applied, CatalogStore, DEFAULT_TIER, Mutation, OrderStore, Result, StoreError, UnitOfWork,
    check_coupon_use, check_points,
};

#[derive(Debug, Default)]
struct State {
    establishments: HashMap<EstablishmentId, Establishment>,
    products: HashMap<ProductId, Product>,
    coupons: HashMap<String, Coupon>,
    redemptions: Vec<CouponRedemption>,
    accounts: HashMap<CustomerId, LoyaltyAccount>,
    loyalty: Vec<LoyaltyTransaction>,
    orders: HashMap<OrderId, Order>,
    items: HashMap<OrderId, Vec<OrderItem>>,
    events: Vec<OrderEvent>,
    last_sequence: i64,
    fail_next_event_write: bool,
}

impl State {
    fn coupon_usage(&self, code: &str, customer_id: CustomerId, order_id: OrderId) -> CouponUsage {
        self.redemptions
            .iter()
            .filter(|r| r.coupon_code == code)
            .fold(CouponUsage::default(), |mut usage, r| {
                usage.total += 1;
                if r.customer_id == customer_id {
                    usage.by_customer += 1;
                    usage.on_order |= r.order_id == order_id;
                }
                usage
            })
    }

    fn balance(&self, customer_id: CustomerId) -> i64 {
        self.accounts
            .get(&customer_id)
            .map_or(0, |account| account.points_balance)
    }

    /// Validates every mutation against the current state without writing.
    fn check(&mut self, unit: &UnitOfWork) -> Result<()> {
        let mut balances: HashMap<CustomerId, i64> = HashMap::new();
        let mut pending: Vec<&CouponRedemption> = Vec::new();

        for mutation in unit.mutations() {
            match mutation {
                Mutation::RedeemCoupon(redemption) => {
                    let coupon = self
                        .coupons
                        .get(&redemption.coupon_code)
                        .ok_or_else(|| StoreError::CouponNotFound(redemption.coupon_code.clone()))?;

                    let mut usage = self.coupon_usage(
                        &redemption.coupon_code,
                        redemption.customer_id,
                        redemption.order_id,
                    );
                    for earlier in pending.iter().filter(|r| r.coupon_code == coupon.code) {
                        usage.total += 1;
                        if earlier.customer_id == redemption.customer_id {
                            usage.by_customer += 1;
                            usage.on_order |= earlier.order_id == redemption.order_id;
                        }
                    }

                    check_coupon_use(coupon, usage, redemption.customer_id)?;
                    pending.push(redemption);
                }
                Mutation::PostLoyalty(transaction) => {
                    let customer_id = transaction.customer_id;
                    let balance = match balances.get(&customer_id) {
                        Some(balance) => *balance,
                        None => self.balance(customer_id),
                    };
                    let next = check_points(customer_id, balance, transaction.delta)?;
                    balances.insert(customer_id, next);
                }
                Mutation::InsertOrder { order, .. } => {
                    if self.orders.contains_key(&order.id) {
                        return Err(StoreError::OrderExists(order.id));
                    }
                }
                Mutation::UpdateOrder {
                    order,
                    expected_status,
                } => {
                    let current = self
                        .orders
                        .get(&order.id)
                        .ok_or(StoreError::OrderNotFound(order.id))?;
                    if current.status != *expected_status {
                        return Err(StoreError::StatusMismatch {
                            order_id: order.id,
                            expected: *expected_status,
                            actual: current.status,
                        });
                    }
                }
                Mutation::AppendEvent(_) => {
                    if self.fail_next_event_write {
                        self.fail_next_event_write = false;
                        return Err(StoreError::Unavailable(
                            "order event write failed".to_string(),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Writes a unit that already passed [`State::check`].
    fn write(&mut self, unit: UnitOfWork) -> Vec<OrderEvent> {
        let mut events = Vec::new();

        for mutation in unit.into_mutations() {
            match mutation {
                Mutation::InsertOrder { order, items } => {
                    self.items.insert(order.id, items);
                    self.orders.insert(order.id, order);
                }
                Mutation::UpdateOrder { order, .. } => {
                    self.orders.insert(order.id, order);
                }
                Mutation::RedeemCoupon(redemption) => self.redemptions.push(redemption),
                Mutation::PostLoyalty(transaction) => {
                    let account = self
                        .accounts
                        .entry(transaction.customer_id)
                        .or_insert_with(|| LoyaltyAccount {
                            customer_id: transaction.customer_id,
                            points_balance: 0,
                            tier: DEFAULT_TIER.to_string(),
                            updated_at: transaction.created_at,
                        });
                    account.points_balance += transaction.delta;
                    account.updated_at = transaction.created_at;
                    self.loyalty.push(transaction);
                }
                Mutation::AppendEvent(event) => {
                    self.last_sequence += 1;
                    let stored = event.into_stored(self.last_sequence);
                    self.events.push(stored.clone());
                    events.push(stored);
                }
            }
        }

        events
    }
}

/// In-memory store for tests and local runs.
///
/// A unit of work is checked and written under a single write guard with no
/// await points in between, so it is atomic with respect to every other
/// reader and writer.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next audit event write fail, rolling back its unit of work.
    pub async fn fail_next_event_write(&self) {
        self.state.write().await.fail_next_event_write = true;
    }

    /// Returns the total number of stored order events.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Returns how many times a coupon has been redeemed.
    pub async fn redemption_count(&self, code: &str) -> usize {
        self.state
            .read()
            .await
            .redemptions
            .iter()
            .filter(|r| r.coupon_code == code)
            .count()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.state.read().await.coupons.get(code).cloned())
    }

    async fn get_coupon_usage(
        &self,
        code: &str,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<CouponUsage> {
        Ok(self
            .state
            .read()
            .await
            .coupon_usage(code, customer_id, order_id))
    }

    async fn get_loyalty_account(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<LoyaltyAccount>> {
        Ok(self.state.read().await.accounts.get(&customer_id).cloned())
    }

    async fn get_loyalty_transactions(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<LoyaltyTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .loyalty
            .iter()
            .filter(|t| t.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let state = self.state.read().await;
        let mut items = state.items.get(&order_id).cloned().unwrap_or_default();
        items.sort_by_key(|item| item.position);
        Ok(items)
    }

    async fn get_order_events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .events
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.sequence.cmp(&b.sequence))
        });
        Ok(events)
    }

    async fn apply(&self, unit: UnitOfWork) -> Result<Applied> {
        unit.validate().map_err(StoreError::InvalidUnit)?;
        let order = unit
            .order()
            .cloned()
            .ok_or_else(|| StoreError::InvalidUnit("unit writes no order".to_string()))?;

        let mut state = self.state.write().await;
        state.check(&unit)?;
        let events = state.write(unit);

        Ok(Applied { order, events })
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn create_establishment(&self, fields: EstablishmentFields) -> Result<Establishment> {
        let now = Utc::now();
        let establishment = Establishment {
            id: EstablishmentId::new(),
            name: fields.name,
            description: fields.description,
            address: fields.address,
            image_key: fields.image_key,
            banner_key: fields.banner_key,
            phone: fields.phone,
            created_at: now,
            updated_at: now,
        };
        self.state
            .write()
            .await
            .establishments
            .insert(establishment.id, establishment.clone());
        Ok(establishment)
    }

    async fn list_establishments(&self) -> Result<Vec<Establishment>> {
        let state = self.state.read().await;
        let mut list: Vec<_> = state.establishments.values().cloned().collect();
        list.sort_by_key(|e| e.created_at);
        Ok(list)
    }

    async fn get_establishment(&self, id: EstablishmentId) -> Result<Option<Establishment>> {
        Ok(self.state.read().await.establishments.get(&id).cloned())
    }

    async fn update_establishment(
        &self,
        id: EstablishmentId,
        fields: EstablishmentFields,
    ) -> Result<Option<Establishment>> {
        let mut state = self.state.write().await;
        let Some(establishment) = state.establishments.get_mut(&id) else {
            return Ok(None);
        };
        establishment.name = fields.name;
        establishment.description = fields.description;
        establishment.address = fields.address;
        establishment.image_key = fields.image_key;
        establishment.banner_key = fields.banner_key;
        establishment.phone = fields.phone;
        establishment.updated_at = Utc::now();
        Ok(Some(establishment.clone()))
    }

    async fn delete_establishment(&self, id: EstablishmentId) -> Result<bool> {
        let mut state = self.state.write().await;
        let removed = state.establishments.remove(&id).is_some();
        if removed {
            state.products.retain(|_, p| p.establishment_id != id);
        }
        Ok(removed)
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.establishments.contains_key(&product.establishment_id) {
            return Err(StoreError::InvalidRecord(format!(
                "product {} references unknown establishment {}",
                product.id, product.establishment_id
            )));
        }
        if product.price.is_negative() {
            return Err(StoreError::InvalidRecord(format!(
                "product {} has a negative price",
                product.id
            )));
        }
        state.products.insert(product.id, product);
        Ok(())
    }

    async fn upsert_coupon(&self, coupon: Coupon) -> Result<()> {
        coupon.check().map_err(StoreError::InvalidRecord)?;
        self.state
            .write()
            .await
            .coupons
            .insert(coupon.code.clone(), coupon);
        Ok(())
    }

    async fn open_loyalty_account(
        &self,
        customer_id: CustomerId,
        tier: &str,
        initial_points: i64,
    ) -> Result<LoyaltyAccount> {
        if initial_points < 0 {
            return Err(StoreError::InvalidRecord(
                "initial points must not be negative".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if let Some(existing) = state.accounts.get(&customer_id) {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let account = LoyaltyAccount {
            customer_id,
            points_balance: initial_points,
            tier: tier.to_string(),
            updated_at: now,
        };
        state.accounts.insert(customer_id, account.clone());
        if initial_points > 0 {
            state.loyalty.push(LoyaltyTransaction::new(
                customer_id,
                None,
                initial_points,
                LoyaltyReason::OpeningBalance,
                now,
            ));
        }
        Ok(account)
    }
}
