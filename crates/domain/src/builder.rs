//! Order validation and pricing before commit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{
    Coupon, CustomerId, EstablishmentId, Order, OrderId, OrderItem, OrderStatus, Product,
    ProductId,
};
use serde::{Deserialize, Serialize};
use store::{OrderStore, OrderStoreExt, check_coupon_use};

use crate::config::EngineConfig;
use crate::error::{OrderError, Result};
use crate::pricing::PriceBreakdown;

/// One requested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// A proposed order as submitted by a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub customer_id: CustomerId,
    pub establishment_id: EstablishmentId,
    pub items: Vec<ItemRequest>,

    #[serde(default)]
    pub coupon_code: Option<String>,

    #[serde(default)]
    pub redeem_points: Option<u32>,
}

/// A priced, validated order that has not been committed.
///
/// The draft carries its order id, so committing the same draft twice is
/// detected by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderDraft {
    pub fn price(&self) -> PriceBreakdown {
        PriceBreakdown {
            subtotal: self.order.subtotal,
            coupon_discount: self.order.coupon_discount,
            loyalty_discount: self.order.loyalty_discount,
            total: self.order.total,
        }
    }
}

/// Validates and prices [`OrderRequest`]s against a store.
///
/// The builder only reads; nothing is written until the draft is committed.
pub struct OrderBuilder<'a, S: ?Sized> {
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S: OrderStore + ?Sized> OrderBuilder<'a, S> {
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Builds a draft as of `now`, failing on the first violated rule.
    pub async fn build(&self, request: OrderRequest, now: DateTime<Utc>) -> Result<OrderDraft> {
        if request.items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        let order_id = OrderId::new();

        let products = self.load_products(&request).await?;
        for line in &request.items {
            let available = products.get(&line.product_id).is_some_and(|p| {
                p.active && p.establishment_id == request.establishment_id
            });
            if !available {
                return Err(OrderError::ProductUnavailable {
                    product_id: line.product_id,
                });
            }
        }
        for line in &request.items {
            if line.quantity <= 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: line.product_id,
                    quantity: line.quantity,
                });
            }
        }

        let items = merge_lines(order_id, &request.items, &products)?;

        let coupon = match request.coupon_code.as_deref() {
            Some(code) => Some(
                self.check_coupon(code, request.customer_id, order_id, now)
                    .await?,
            ),
            None => None,
        };

        let points = i64::from(request.redeem_points.unwrap_or(0));
        if points > 0 {
            let balance = self
                .config
                .bounded(self.store.points_balance(request.customer_id))
                .await?;
            if balance < points {
                return Err(OrderError::InsufficientPoints {
                    balance,
                    requested: points,
                });
            }
        }

        let price =
            PriceBreakdown::compute(&items, coupon.as_ref(), self.config.points_value(points))
                .ok_or(OrderError::OrderTooLarge)?;

        let order = Order {
            id: order_id,
            customer_id: request.customer_id,
            establishment_id: request.establishment_id,
            coupon_code: coupon.map(|c| c.code),
            loyalty_points_applied: points,
            subtotal: price.subtotal,
            coupon_discount: price.coupon_discount,
            loyalty_discount: price.loyalty_discount,
            total: price.total,
            status: OrderStatus::Pending,
            ordered_at: now,
            processed_at: None,
            completed_at: None,
            updated_at: now,
        };

        Ok(OrderDraft { order, items })
    }

    async fn load_products(&self, request: &OrderRequest) -> Result<HashMap<ProductId, Product>> {
        let mut ids: Vec<ProductId> = request.items.iter().map(|l| l.product_id).collect();
        ids.sort();
        ids.dedup();

        let products = self.config.bounded(self.store.get_products(&ids)).await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn check_coupon(
        &self,
        code: &str,
        customer_id: CustomerId,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Coupon> {
        let coupon = self
            .config
            .bounded(self.store.get_coupon(code))
            .await?
            .ok_or_else(|| OrderError::CouponInvalid {
                code: code.to_string(),
            })?;

        if !coupon.is_valid_on(now.date_naive()) {
            return Err(OrderError::CouponExpired {
                code: coupon.code,
            });
        }

        let usage = self
            .config
            .bounded(self.store.get_coupon_usage(code, customer_id, order_id))
            .await?;
        check_coupon_use(&coupon, usage, customer_id)?;

        Ok(coupon)
    }
}

/// Snapshots prices into lines, merging repeated products into the first
/// line that named them.
fn merge_lines(
    order_id: OrderId,
    requested: &[ItemRequest],
    products: &HashMap<ProductId, Product>,
) -> Result<Vec<OrderItem>> {
    let mut merged: Vec<(ProductId, i32)> = Vec::with_capacity(requested.len());
    let mut index: HashMap<ProductId, usize> = HashMap::new();

    for line in requested {
        match index.get(&line.product_id) {
            Some(&i) => {
                let quantity = merged[i].1.checked_add(line.quantity).ok_or(
                    OrderError::InvalidQuantity {
                        product_id: line.product_id,
                        quantity: line.quantity,
                    },
                )?;
                merged[i].1 = quantity;
            }
            None => {
                index.insert(line.product_id, merged.len());
                merged.push((line.product_id, line.quantity));
            }
        }
    }

    merged
        .into_iter()
        .enumerate()
        .map(|(position, (product_id, quantity))| {
            let product = products
                .get(&product_id)
                .ok_or(OrderError::ProductUnavailable { product_id })?;
            OrderItem::new(order_id, product, position as i32, quantity)
                .ok_or(OrderError::InvalidQuantity {
                    product_id,
                    quantity,
                })
        })
        .collect()
}
