use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    Coupon, CouponRedemption, CouponUsage, CustomerId, DiscountType, Establishment,
    EstablishmentFields, EstablishmentId, LoyaltyAccount, LoyaltyReason, LoyaltyTransaction,
    Money, NewOrderEvent, Order, OrderEvent, OrderId, OrderItem, OrderStatus, Product, ProductId,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Applied, CatalogStore, DEFAULT_TIER, Mutation, OrderStore, Result, StoreError, UnitOfWork,
    check_coupon_use,
};

const ORDER_COLUMNS: &str = "id, customer_id, establishment_id, coupon_code, \
     loyalty_points_applied, subtotal_cents, coupon_discount_cents, loyalty_discount_cents, \
     total_cents, status, ordered_at, processed_at, completed_at, updated_at";

const ESTABLISHMENT_COLUMNS: &str =
    "id, name, description, address, image_key, banner_key, phone, created_at, updated_at";

/// PostgreSQL-backed order store.
///
/// `apply` runs inside one transaction. Rows a unit depends on (the order
/// and each redeemed coupon) are locked with `SELECT ... FOR UPDATE` before
/// they are checked, and loyalty accounts move through a guarded upsert that
/// locks the account row. Concurrent units that touch the same rows
/// serialize while unrelated orders proceed in parallel.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
            establishment_id: EstablishmentId::from_uuid(row.try_get("establishment_id")?),
            coupon_code: row.try_get("coupon_code")?,
            loyalty_points_applied: row.try_get("loyalty_points_applied")?,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            coupon_discount: Money::from_cents(row.try_get("coupon_discount_cents")?),
            loyalty_discount: Money::from_cents(row.try_get("loyalty_discount_cents")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            status: OrderStatus::from_str(&status)
                .map_err(|e| StoreError::InvalidRecord(e.to_string()))?,
            ordered_at: row.try_get("ordered_at")?,
            processed_at: row.try_get("processed_at")?,
            completed_at: row.try_get("completed_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            product_name: row.try_get("product_name")?,
            position: row.try_get("position")?,
            quantity: row.try_get("quantity")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
        })
    }

    fn row_to_event(row: &PgRow) -> Result<OrderEvent> {
        Ok(OrderEvent {
            sequence: row.try_get("sequence")?,
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_coupon(row: &PgRow) -> Result<Coupon> {
        let discount_type: String = row.try_get("discount_type")?;
        Ok(Coupon {
            code: row.try_get("code")?,
            discount_type: DiscountType::from_str(&discount_type)
                .map_err(StoreError::InvalidRecord)?,
            discount_value: row.try_get("discount_value")?,
            valid_from: row.try_get("valid_from")?,
            valid_until: row.try_get("valid_until")?,
            max_uses: row.try_get("max_uses")?,
        })
    }

    fn row_to_account(row: &PgRow) -> Result<LoyaltyAccount> {
        Ok(LoyaltyAccount {
            customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
            points_balance: row.try_get("points_balance")?,
            tier: row.try_get("tier")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_transaction(row: &PgRow) -> Result<LoyaltyTransaction> {
        let reason: String = row.try_get("reason")?;
        Ok(LoyaltyTransaction {
            id: row.try_get("id")?,
            customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
            order_id: row
                .try_get::<Option<Uuid>, _>("order_id")?
                .map(OrderId::from_uuid),
            delta: row.try_get("delta")?,
            reason: LoyaltyReason::from_str(&reason).map_err(StoreError::InvalidRecord)?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_establishment(row: &PgRow) -> Result<Establishment> {
        Ok(Establishment {
            id: EstablishmentId::from_uuid(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            address: row.try_get("address")?,
            image_key: row.try_get("image_key")?,
            banner_key: row.try_get("banner_key")?,
            phone: row.try_get("phone")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Locks and checks the order and coupon rows the unit depends on.
    async fn check_unit(tx: &mut Transaction<'_, Postgres>, unit: &UnitOfWork) -> Result<()> {
        let mut pending: Vec<&CouponRedemption> = Vec::new();

        for mutation in unit.mutations() {
            match mutation {
                Mutation::RedeemCoupon(redemption) => {
                    let row = sqlx::query(
                        r#"
                        SELECT code, discount_type, discount_value, valid_from, valid_until, max_uses
                        FROM coupons
                        WHERE code = $1
                        FOR UPDATE
                        "#,
                    )
                    .bind(&redemption.coupon_code)
                    .fetch_optional(&mut **tx)
                    .await?
                    .ok_or_else(|| StoreError::CouponNotFound(redemption.coupon_code.clone()))?;
                    let coupon = Self::row_to_coupon(&row)?;

                    let mut usage = Self::usage(
                        &mut **tx,
                        &redemption.coupon_code,
                        redemption.customer_id,
                        redemption.order_id,
                    )
                    .await?;
                    for earlier in pending.iter().filter(|r| r.coupon_code == coupon.code) {
                        usage.total += 1;
                        if earlier.customer_id == redemption.customer_id {
                            usage.by_customer += 1;
                            usage.on_order |= earlier.order_id == redemption.order_id;
                        }
                    }

                    check_coupon_use(&coupon, usage, redemption.customer_id)?;
                    pending.push(redemption);
                }
                Mutation::InsertOrder { order, .. } => {
                    let exists: bool =
                        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
                            .bind(order.id.as_uuid())
                            .fetch_one(&mut **tx)
                            .await?;
                    if exists {
                        return Err(StoreError::OrderExists(order.id));
                    }
                }
                Mutation::UpdateOrder {
                    order,
                    expected_status,
                } => {
                    let status: String =
                        sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                            .bind(order.id.as_uuid())
                            .fetch_optional(&mut **tx)
                            .await?
                            .ok_or(StoreError::OrderNotFound(order.id))?;
                    let actual = OrderStatus::from_str(&status)
                        .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
                    if actual != *expected_status {
                        return Err(StoreError::StatusMismatch {
                            order_id: order.id,
                            expected: *expected_status,
                            actual,
                        });
                    }
                }
                Mutation::PostLoyalty(_) | Mutation::AppendEvent(_) => {}
            }
        }

        Ok(())
    }

    async fn usage<'e, E>(
        executor: E,
        code: &str,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<CouponUsage>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE customer_id = $2) AS by_customer,
                COUNT(*) FILTER (WHERE customer_id = $2 AND order_id = $3) AS on_order
            FROM coupon_redemptions
            WHERE coupon_code = $1
            "#,
        )
        .bind(code)
        .bind(customer_id.as_uuid())
        .bind(order_id.as_uuid())
        .fetch_one(executor)
        .await?;

        Ok(CouponUsage {
            total: row.try_get("total")?,
            by_customer: row.try_get("by_customer")?,
            on_order: row.try_get::<i64, _>("on_order")? > 0,
        })
    }

    /// Writes a checked unit: order row and items first, then redemptions,
    /// loyalty postings and audit events.
    async fn write_unit(
        tx: &mut Transaction<'_, Postgres>,
        mutations: Vec<Mutation>,
    ) -> Result<Vec<OrderEvent>> {
        let mut redemptions = Vec::new();
        let mut postings = Vec::new();
        let mut new_events = Vec::new();

        for mutation in mutations {
            match mutation {
                Mutation::InsertOrder { order, items } => {
                    Self::insert_order(tx, &order).await?;
                    for item in &items {
                        Self::insert_item(tx, item).await?;
                    }
                }
                Mutation::UpdateOrder { order, .. } => Self::update_order(tx, &order).await?,
                Mutation::RedeemCoupon(redemption) => redemptions.push(redemption),
                Mutation::PostLoyalty(transaction) => postings.push(transaction),
                Mutation::AppendEvent(event) => new_events.push(event),
            }
        }

        for redemption in &redemptions {
            sqlx::query(
                r#"
                INSERT INTO coupon_redemptions (id, coupon_code, customer_id, order_id, redeemed_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(redemption.id)
            .bind(&redemption.coupon_code)
            .bind(redemption.customer_id.as_uuid())
            .bind(redemption.order_id.as_uuid())
            .bind(redemption.redeemed_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_constraint(e, || redemption_conflict(redemption)))?;
        }

        for transaction in &postings {
            Self::post_loyalty(tx, transaction).await?;
        }

        let mut events = Vec::with_capacity(new_events.len());
        for event in new_events {
            events.push(Self::insert_event(tx, event).await?);
        }

        Ok(events)
    }

    async fn insert_order(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, establishment_id, coupon_code, loyalty_points_applied,
                subtotal_cents, coupon_discount_cents, loyalty_discount_cents, total_cents,
                status, ordered_at, processed_at, completed_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.establishment_id.as_uuid())
        .bind(&order.coupon_code)
        .bind(order.loyalty_points_applied)
        .bind(order.subtotal.cents())
        .bind(order.coupon_discount.cents())
        .bind(order.loyalty_discount.cents())
        .bind(order.total.cents())
        .bind(order.status.as_str())
        .bind(order.ordered_at)
        .bind(order.processed_at)
        .bind(order.completed_at)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_constraint(e, || Some(StoreError::OrderExists(order.id))))?;
        Ok(())
    }

    async fn insert_item(tx: &mut Transaction<'_, Postgres>, item: &OrderItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (
                order_id, position, product_id, product_name, quantity,
                unit_price_cents, total_price_cents
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.order_id.as_uuid())
        .bind(item.position)
        .bind(item.product_id.as_uuid())
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.unit_price.cents())
        .bind(item.total_price.cents())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_order(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, processed_at = $3, completed_at = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.processed_at)
        .bind(order.completed_at)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Moves the account balance by the posting's delta. The update is
    /// guarded so the balance never goes negative; concurrent postings wait
    /// on the account row and re-check against the committed balance.
    async fn post_loyalty(
        tx: &mut Transaction<'_, Postgres>,
        transaction: &LoyaltyTransaction,
    ) -> Result<()> {
        let overdraft = |balance: i64| StoreError::InsufficientPoints {
            customer_id: transaction.customer_id,
            balance,
            requested: -transaction.delta,
        };

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO loyalty_accounts (customer_id, points_balance, tier, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (customer_id) DO UPDATE SET
                points_balance = loyalty_accounts.points_balance + EXCLUDED.points_balance,
                updated_at = EXCLUDED.updated_at
            WHERE loyalty_accounts.points_balance + EXCLUDED.points_balance >= 0
            RETURNING points_balance
            "#,
        )
        .bind(transaction.customer_id.as_uuid())
        .bind(transaction.delta)
        .bind(DEFAULT_TIER)
        .bind(transaction.created_at)
        .fetch_optional(&mut **tx)
        .await
        // A debit against a missing account trips the check on insert.
        .map_err(|e| map_constraint(e, || Some(overdraft(0))))?;

        if updated.is_none() {
            let balance: i64 = sqlx::query_scalar(
                "SELECT points_balance FROM loyalty_accounts WHERE customer_id = $1",
            )
            .bind(transaction.customer_id.as_uuid())
            .fetch_one(&mut **tx)
            .await?;
            return Err(overdraft(balance));
        }

        Self::insert_transaction(&mut **tx, transaction).await
    }

    async fn insert_transaction<'e, E>(executor: E, transaction: &LoyaltyTransaction) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO loyalty_transactions (id, customer_id, order_id, delta, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.customer_id.as_uuid())
        .bind(transaction.order_id.map(|id| id.as_uuid()))
        .bind(transaction.delta)
        .bind(transaction.reason.as_str())
        .bind(transaction.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn insert_event(
        tx: &mut Transaction<'_, Postgres>,
        event: NewOrderEvent,
    ) -> Result<OrderEvent> {
        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_events (id, order_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING sequence
            "#,
        )
        .bind(event.id)
        .bind(event.order_id.as_uuid())
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.created_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(event.into_stored(sequence))
    }
}

fn redemption_conflict(redemption: &CouponRedemption) -> Option<StoreError> {
    Some(StoreError::CouponAlreadyUsed {
        code: redemption.coupon_code.clone(),
        customer_id: redemption.customer_id,
    })
}

/// Maps a known constraint violation to the domain error `on_violation`
/// produces; every other failure stays a database error.
fn map_constraint(
    error: sqlx::Error,
    on_violation: impl FnOnce() -> Option<StoreError>,
) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = error
        && matches!(
            db_err.constraint(),
            Some("orders_pkey")
                | Some("coupon_redemptions_unique_use")
                | Some("loyalty_accounts_balance_non_negative")
        )
        && let Some(mapped) = on_violation()
    {
        return mapped;
    }
    StoreError::Database(error)
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, establishment_id, name, price_cents, active
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Product {
                    id: ProductId::from_uuid(row.try_get("id")?),
                    establishment_id: EstablishmentId::from_uuid(row.try_get("establishment_id")?),
                    name: row.try_get("name")?,
                    price: Money::from_cents(row.try_get("price_cents")?),
                    active: row.try_get("active")?,
                })
            })
            .collect()
    }

    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query(
            r#"
            SELECT code, discount_type, discount_value, valid_from, valid_until, max_uses
            FROM coupons
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_coupon).transpose()
    }

    async fn get_coupon_usage(
        &self,
        code: &str,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<CouponUsage> {
        Self::usage(&self.pool, code, customer_id, order_id).await
    }

    async fn get_loyalty_account(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<LoyaltyAccount>> {
        let row = sqlx::query(
            "SELECT customer_id, points_balance, tier, updated_at FROM loyalty_accounts WHERE customer_id = $1",
        )
        .bind(customer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    async fn get_loyalty_transactions(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<LoyaltyTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, order_id, delta, reason, created_at
            FROM loyalty_transactions
            WHERE customer_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, position, product_id, product_name, quantity,
                   unit_price_cents, total_price_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn get_order_events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, order_id, event_type, payload, created_at
            FROM order_events
            WHERE order_id = $1
            ORDER BY created_at ASC, sequence ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }

    async fn apply(&self, unit: UnitOfWork) -> Result<Applied> {
        unit.validate().map_err(StoreError::InvalidUnit)?;
        let order = unit
            .order()
            .cloned()
            .ok_or_else(|| StoreError::InvalidUnit("unit writes no order".to_string()))?;

        let mut tx = self.pool.begin().await?;
        Self::check_unit(&mut tx, &unit).await?;
        let events = Self::write_unit(&mut tx, unit.into_mutations()).await?;
        tx.commit().await?;

        tracing::debug!(order_id = %order.id, events = events.len(), "unit of work applied");
        Ok(Applied { order, events })
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn create_establishment(&self, fields: EstablishmentFields) -> Result<Establishment> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO establishments (id, name, description, address, image_key, banner_key, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ESTABLISHMENT_COLUMNS}
            "#
        ))
        .bind(EstablishmentId::new().as_uuid())
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(&fields.address)
        .bind(&fields.image_key)
        .bind(&fields.banner_key)
        .bind(&fields.phone)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_establishment(&row)
    }

    async fn list_establishments(&self) -> Result<Vec<Establishment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ESTABLISHMENT_COLUMNS} FROM establishments ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_establishment).collect()
    }

    async fn get_establishment(&self, id: EstablishmentId) -> Result<Option<Establishment>> {
        let row = sqlx::query(&format!(
            "SELECT {ESTABLISHMENT_COLUMNS} FROM establishments WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_establishment).transpose()
    }

    async fn update_establishment(
        &self,
        id: EstablishmentId,
        fields: EstablishmentFields,
    ) -> Result<Option<Establishment>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE establishments
            SET name = $2, description = $3, address = $4, image_key = $5,
                banner_key = $6, phone = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING {ESTABLISHMENT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(&fields.address)
        .bind(&fields.image_key)
        .bind(&fields.banner_key)
        .bind(&fields.phone)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_establishment).transpose()
    }

    async fn delete_establishment(&self, id: EstablishmentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM establishments WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, establishment_id, name, price_cents, active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                establishment_id = EXCLUDED.establishment_id,
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                active = EXCLUDED.active
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.establishment_id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.active)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                StoreError::InvalidRecord(format!(
                    "product {} references unknown establishment {}",
                    product.id, product.establishment_id
                ))
            }
            sqlx::Error::Database(ref db_err) if db_err.is_check_violation() => {
                StoreError::InvalidRecord(format!("product {} has a negative price", product.id))
            }
            other => StoreError::Database(other),
        })?;
        Ok(())
    }

    async fn upsert_coupon(&self, coupon: Coupon) -> Result<()> {
        coupon.check().map_err(StoreError::InvalidRecord)?;
        sqlx::query(
            r#"
            INSERT INTO coupons (code, discount_type, discount_value, valid_from, valid_until, max_uses)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (code) DO UPDATE SET
                discount_type = EXCLUDED.discount_type,
                discount_value = EXCLUDED.discount_value,
                valid_from = EXCLUDED.valid_from,
                valid_until = EXCLUDED.valid_until,
                max_uses = EXCLUDED.max_uses
            "#,
        )
        .bind(&coupon.code)
        .bind(coupon.discount_type.as_str())
        .bind(coupon.discount_value)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.max_uses)
        .execute(&self.pool)
        .await?;
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

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let inserted = sqlx::query(
            r#"
            INSERT INTO loyalty_accounts (customer_id, points_balance, tier, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (customer_id) DO NOTHING
            RETURNING customer_id, points_balance, tier, updated_at
            "#,
        )
        .bind(customer_id.as_uuid())
        .bind(initial_points)
        .bind(tier)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let account = match inserted {
            Some(row) => {
                let account = Self::row_to_account(&row)?;
                if initial_points > 0 {
                    let opening = LoyaltyTransaction::new(
                        customer_id,
                        None,
                        initial_points,
                        LoyaltyReason::OpeningBalance,
                        now,
                    );
                    Self::insert_transaction(&mut *tx, &opening).await?;
                }
                account
            }
            None => {
                let row = sqlx::query(
                    "SELECT customer_id, points_balance, tier, updated_at FROM loyalty_accounts WHERE customer_id = $1",
                )
                .bind(customer_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
                Self::row_to_account(&row)?
            }
        };

        tx.commit().await?;
        Ok(account)
    }
}
