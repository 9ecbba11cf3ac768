use chrono::NaiveDate;
use common::{
    Coupon, CustomerId, DiscountType, EstablishmentFields, EstablishmentId, Money, OrderId,
    OrderItem, OrderStatus, Product, ProductId,
};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{ItemRequest, OrderHistory, OrderRequest, OrderService, PriceBreakdown, Transition};
use store::{CatalogStore, InMemoryStore, OrderStore};

fn coupon() -> Coupon {
    Coupon {
        code: "SAVE10".to_string(),
        discount_type: DiscountType::Percentage,
        discount_value: 10,
        valid_from: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        valid_until: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
        max_uses: None,
    }
}

fn bench_price_breakdown(c: &mut Criterion) {
    let order_id = OrderId::new();
    let items: Vec<OrderItem> = (0..50)
        .map(|i| {
            let product = Product {
                id: ProductId::new(),
                establishment_id: EstablishmentId::new(),
                name: format!("Dish {i}"),
                price: Money::from_cents(100 * (i + 1)),
                active: true,
            };
            OrderItem::new(order_id, &product, i as i32, 2).unwrap()
        })
        .collect();
    let coupon = coupon();

    c.bench_function("pricing/50_lines_coupon_points", |b| {
        b.iter(|| PriceBreakdown::compute(&items, Some(&coupon), Money::from_cents(500)).unwrap());
    });
}

fn bench_place_and_complete(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let (establishment_id, product_id) = rt.block_on(async {
        let establishment = store
            .create_establishment(EstablishmentFields {
                name: "Bench Bistro".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let product = Product {
            id: ProductId::new(),
            establishment_id: establishment.id,
            name: "Soup".to_string(),
            price: Money::from_cents(850),
            active: true,
        };
        let product_id = product.id;
        store.upsert_product(product).await.unwrap();
        store.upsert_coupon(coupon()).await.unwrap();
        (establishment.id, product_id)
    });
    let service = OrderService::new(store);

    c.bench_function("engine/place_process_complete", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order = service
                    .place_order(OrderRequest {
                        customer_id: CustomerId::new(),
                        establishment_id,
                        items: vec![ItemRequest {
                            product_id,
                            quantity: 3,
                        }],
                        coupon_code: Some("SAVE10".to_string()),
                        redeem_points: None,
                    })
                    .await
                    .unwrap();
                service
                    .transition_order(order.id, Transition::to(OrderStatus::Processing))
                    .await
                    .unwrap();
                service
                    .transition_order(order.id, Transition::to(OrderStatus::Completed))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_history_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let service = OrderService::new(store.clone());
    let order_id = rt.block_on(async {
        let establishment = store
            .create_establishment(EstablishmentFields {
                name: "Replay Diner".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let product = Product {
            id: ProductId::new(),
            establishment_id: establishment.id,
            name: "Pie".to_string(),
            price: Money::from_cents(1200),
            active: true,
        };
        let product_id = product.id;
        store.upsert_product(product).await.unwrap();

        let order = service
            .place_order(OrderRequest {
                customer_id: CustomerId::new(),
                establishment_id: establishment.id,
                items: vec![ItemRequest {
                    product_id,
                    quantity: 1,
                }],
                coupon_code: None,
                redeem_points: None,
            })
            .await
            .unwrap();
        for to in [OrderStatus::Processing, OrderStatus::Completed] {
            service
                .transition_order(order.id, Transition::to(to).with_actor("kitchen"))
                .await
                .unwrap();
        }
        order.id
    });
    let events = rt.block_on(store.get_order_events(order_id)).unwrap();

    c.bench_function("audit/replay_completed_order", |b| {
        b.iter(|| OrderHistory::replay(&events).unwrap());
    });
}

criterion_group!(
    benches,
    bench_price_breakdown,
    bench_place_and_complete,
    bench_history_replay,
);
criterion_main!(benches);
