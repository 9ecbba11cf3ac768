//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use common::{
    Coupon, CouponRedemption, CustomerId, DiscountType, EstablishmentFields, EstablishmentId,
    LoyaltyReason, LoyaltyTransaction, Money, NewOrderEvent, Order, OrderId, OrderItem,
    OrderStatus, Product, ProductId,
};
use sqlx::PgPool;
use store::{
    CatalogStore, Mutation, OrderStore, OrderStoreExt, PostgresStore, StoreError, UnitOfWork,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_order_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_events, loyalty_transactions, coupon_redemptions, order_items, \
         orders, loyalty_accounts, coupons, products, establishments",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

async fn seed_product(store: &PostgresStore, price_cents: i64) -> Product {
    let establishment = store
        .create_establishment(EstablishmentFields {
            name: "Test Kitchen".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let product = Product {
        id: ProductId::new(),
        establishment_id: establishment.id,
        name: "Burger".to_string(),
        price: Money::from_cents(price_cents),
        active: true,
    };
    store.upsert_product(product.clone()).await.unwrap();
    product
}

fn pending_order(customer_id: CustomerId, total_cents: i64) -> Order {
    let now = Utc::now();
    Order {
        id: OrderId::new(),
        customer_id,
        establishment_id: EstablishmentId::new(),
        coupon_code: None,
        loyalty_points_applied: 0,
        subtotal: Money::from_cents(total_cents),
        coupon_discount: Money::zero(),
        loyalty_discount: Money::zero(),
        total: Money::from_cents(total_cents),
        status: OrderStatus::Pending,
        ordered_at: now,
        processed_at: None,
        completed_at: None,
        updated_at: now,
    }
}

fn commit_unit(order: &Order, items: Vec<OrderItem>) -> UnitOfWork {
    UnitOfWork::new(order.id)
        .with(Mutation::InsertOrder {
            order: order.clone(),
            items,
        })
        .with(Mutation::AppendEvent(NewOrderEvent::new(
            order.id,
            "PENDING",
            serde_json::json!({"status": "PENDING", "prior_status": null}),
            order.ordered_at,
        )))
}

fn redemption(code: &str, order: &Order) -> Mutation {
    Mutation::RedeemCoupon(CouponRedemption {
        id: uuid::Uuid::new_v4(),
        coupon_code: code.to_string(),
        customer_id: order.customer_id,
        order_id: order.id,
        redeemed_at: Utc::now(),
    })
}

fn single_use(code: &str) -> Coupon {
    Coupon {
        code: code.to_string(),
        discount_type: DiscountType::Fixed,
        discount_value: 300,
        valid_from: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        valid_until: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
        max_uses: Some(1),
    }
}

#[tokio::test]
async fn commit_and_load_order() {
    let store = get_test_store().await;
    let product = seed_product(&store, 1000).await;
    let order = pending_order(CustomerId::new(), 2000);
    let item = OrderItem::new(order.id, &product, 0, 2).unwrap();

    let applied = store
        .apply(commit_unit(&order, vec![item.clone()]))
        .await
        .unwrap();
    assert_eq!(applied.events.len(), 1);

    let (loaded, items) = store.load_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.total, Money::from_cents(2000));
    assert_eq!(loaded.status, OrderStatus::Pending);
    assert_eq!(items, vec![item]);

    let events = store.get_order_events(order.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "PENDING");
}

#[tokio::test]
async fn duplicate_commit_is_rejected() {
    let store = get_test_store().await;
    let order = pending_order(CustomerId::new(), 500);

    store.apply(commit_unit(&order, vec![])).await.unwrap();
    let result = store.apply(commit_unit(&order, vec![])).await;
    assert!(matches!(result, Err(StoreError::OrderExists(_))));
}

#[tokio::test]
async fn status_update_is_compare_and_set() {
    let store = get_test_store().await;
    let order = pending_order(CustomerId::new(), 500);
    store.apply(commit_unit(&order, vec![])).await.unwrap();

    let mut processing = order.clone();
    processing.status = OrderStatus::Processing;
    processing.processed_at = Some(Utc::now());
    let unit = |expected| {
        UnitOfWork::new(order.id)
            .with(Mutation::UpdateOrder {
                order: processing.clone(),
                expected_status: expected,
            })
            .with(Mutation::AppendEvent(NewOrderEvent::new(
                order.id,
                "PROCESSING",
                serde_json::json!({"status": "PROCESSING", "prior_status": "PENDING"}),
                Utc::now(),
            )))
    };

    store.apply(unit(OrderStatus::Pending)).await.unwrap();
    let second = store.apply(unit(OrderStatus::Pending)).await;
    assert!(matches!(
        second,
        Err(StoreError::StatusMismatch {
            actual: OrderStatus::Processing,
            ..
        })
    ));
    assert_eq!(store.get_order_events(order.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn insufficient_points_roll_back_the_order() {
    let store = get_test_store().await;
    let customer = CustomerId::new();
    store
        .open_loyalty_account(customer, "silver", 30)
        .await
        .unwrap();

    let order = pending_order(customer, 500);
    let unit = commit_unit(&order, vec![]).with(Mutation::PostLoyalty(LoyaltyTransaction::new(
        customer,
        Some(order.id),
        -50,
        LoyaltyReason::Redemption,
        Utc::now(),
    )));

    let result = store.apply(unit).await;
    assert!(matches!(
        result,
        Err(StoreError::InsufficientPoints { balance: 30, .. })
    ));
    assert!(store.get_order(order.id).await.unwrap().is_none());
    assert_eq!(store.points_balance(customer).await.unwrap(), 30);
}

#[tokio::test]
async fn overdraft_reports_the_balance_left_by_earlier_postings() {
    let store = get_test_store().await;
    let customer = CustomerId::new();
    store
        .open_loyalty_account(customer, "silver", 30)
        .await
        .unwrap();

    let order = pending_order(customer, 500);
    let debit = |delta| {
        Mutation::PostLoyalty(LoyaltyTransaction::new(
            customer,
            Some(order.id),
            delta,
            LoyaltyReason::Redemption,
            Utc::now(),
        ))
    };
    let unit = commit_unit(&order, vec![]).with(debit(-20)).with(debit(-20));

    let result = store.apply(unit).await;
    assert!(matches!(
        result,
        Err(StoreError::InsufficientPoints {
            balance: 10,
            requested: 20,
            ..
        })
    ));
    assert_eq!(store.points_balance(customer).await.unwrap(), 30);
    assert_eq!(store.get_loyalty_transactions(customer).await.unwrap().len(), 1);
}

#[tokio::test]
async fn debit_without_account_reports_zero_balance() {
    let store = get_test_store().await;
    let order = pending_order(CustomerId::new(), 500);
    let unit = commit_unit(&order, vec![]).with(Mutation::PostLoyalty(LoyaltyTransaction::new(
        order.customer_id,
        Some(order.id),
        -5,
        LoyaltyReason::Redemption,
        Utc::now(),
    )));

    let result = store.apply(unit).await;
    assert!(matches!(
        result,
        Err(StoreError::InsufficientPoints {
            balance: 0,
            requested: 5,
            ..
        })
    ));
    assert!(store.get_order(order.id).await.unwrap().is_none());
    assert!(
        store
            .get_loyalty_account(order.customer_id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn concurrent_single_use_coupon_redeemed_once() {
    let store = get_test_store().await;
    store.upsert_coupon(single_use("ONCE")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let order = pending_order(CustomerId::new(), 1000);
            store
                .apply(commit_unit(&order, vec![]).with(redemption("ONCE", &order)))
                .await
        }));
    }

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(StoreError::CouponExhausted { .. }) => {}
            Err(other) => assert!(other.is_serialization_failure(), "unexpected: {other}"),
        }
    }
    assert_eq!(committed, 1);

    let usage = store
        .get_coupon_usage("ONCE", CustomerId::new(), OrderId::new())
        .await
        .unwrap();
    assert_eq!(usage.total, 1);
}

#[tokio::test]
async fn concurrent_debits_never_overdraw() {
    let store = get_test_store().await;
    let customer = CustomerId::new();
    store
        .open_loyalty_account(customer, "gold", 100)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let order = pending_order(customer, 1000);
            let debit = Mutation::PostLoyalty(LoyaltyTransaction::new(
                customer,
                Some(order.id),
                -40,
                LoyaltyReason::Redemption,
                Utc::now(),
            ));
            store.apply(commit_unit(&order, vec![]).with(debit)).await
        }));
    }

    let mut committed = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            committed += 1;
        }
    }
    assert_eq!(committed, 2);
    assert_eq!(store.points_balance(customer).await.unwrap(), 20);

    let ledger = store.get_loyalty_transactions(customer).await.unwrap();
    let sum: i64 = ledger.iter().map(|t| t.delta).sum();
    assert_eq!(sum, 20);
}

#[tokio::test]
async fn credit_opens_account_with_default_tier() {
    let store = get_test_store().await;
    let order = pending_order(CustomerId::new(), 1000);
    let credit = Mutation::PostLoyalty(LoyaltyTransaction::new(
        order.customer_id,
        Some(order.id),
        10,
        LoyaltyReason::Accrual,
        Utc::now(),
    ));
    store
        .apply(commit_unit(&order, vec![]).with(credit))
        .await
        .unwrap();

    let account = store
        .get_loyalty_account(order.customer_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.points_balance, 10);
    assert_eq!(account.tier, store::DEFAULT_TIER);
}

#[tokio::test]
async fn audit_rows_reject_updates() {
    let store = get_test_store().await;
    let order = pending_order(CustomerId::new(), 500);
    store.apply(commit_unit(&order, vec![])).await.unwrap();

    let result = sqlx::query("UPDATE order_events SET event_type = 'TAMPERED' WHERE order_id = $1")
        .bind(order.id.as_uuid())
        .execute(store.pool())
        .await;
    assert!(result.is_err());
}

async fn count_rows(store: &PostgresStore, table: &str, order_id: OrderId) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE order_id = $1"))
        .bind(order_id.as_uuid())
        .fetch_one(store.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn deleting_an_order_removes_what_it_owns() {
    let store = get_test_store().await;
    let product = seed_product(&store, 1000).await;
    store.upsert_coupon(single_use("ONCE")).await.unwrap();
    let order = pending_order(CustomerId::new(), 2000);
    let item = OrderItem::new(order.id, &product, 0, 2).unwrap();

    store
        .apply(commit_unit(&order, vec![item]).with(redemption("ONCE", &order)))
        .await
        .unwrap();
    for table in ["order_items", "order_events", "coupon_redemptions"] {
        assert_eq!(count_rows(&store, table, order.id).await, 1, "{table}");
    }

    sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(order.id.as_uuid())
        .execute(store.pool())
        .await
        .unwrap();

    assert!(store.get_order(order.id).await.unwrap().is_none());
    for table in ["order_items", "order_events", "coupon_redemptions"] {
        assert_eq!(count_rows(&store, table, order.id).await, 0, "{table}");
    }
    // The coupon survives and its use is released.
    let usage = store
        .get_coupon_usage("ONCE", CustomerId::new(), OrderId::new())
        .await
        .unwrap();
    assert_eq!(usage.total, 0);
}

#[tokio::test]
async fn order_with_points_postings_cannot_be_deleted() {
    let store = get_test_store().await;
    let order = pending_order(CustomerId::new(), 1000);
    let credit = Mutation::PostLoyalty(LoyaltyTransaction::new(
        order.customer_id,
        Some(order.id),
        10,
        LoyaltyReason::Accrual,
        Utc::now(),
    ));
    store
        .apply(commit_unit(&order, vec![]).with(credit))
        .await
        .unwrap();

    let result = sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(order.id.as_uuid())
        .execute(store.pool())
        .await;
    assert!(result.is_err());
    assert!(store.get_order(order.id).await.unwrap().is_some());
    assert_eq!(count_rows(&store, "loyalty_transactions", order.id).await, 1);
    assert_eq!(store.points_balance(order.customer_id).await.unwrap(), 10);
}

#[tokio::test]
async fn establishment_crud_round_trip() {
    let store = get_test_store().await;
    let created = store
        .create_establishment(EstablishmentFields {
            name: "Bistro".to_string(),
            address: "1 Main St".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let fetched = store.get_establishment(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.address, "1 Main St");

    let updated = store
        .update_establishment(
            created.id,
            EstablishmentFields {
                name: "Bistro Deux".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.name, "Bistro Deux");
    assert_eq!(updated.address, "");

    assert!(store.delete_establishment(created.id).await.unwrap());
    assert!(store.get_establishment(created.id).await.unwrap().is_none());
    assert!(store.list_establishments().await.unwrap().is_empty());
}

#[tokio::test]
async fn product_with_unknown_establishment_is_invalid() {
    let store = get_test_store().await;
    let result = store
        .upsert_product(Product {
            id: ProductId::new(),
            establishment_id: EstablishmentId::new(),
            name: "Ghost".to_string(),
            price: Money::from_cents(100),
            active: true,
        })
        .await;
    assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
}
