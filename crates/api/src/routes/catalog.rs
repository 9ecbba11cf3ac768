//! Catalog seeding: products, coupons and loyalty accounts.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::NaiveDate;
use common::{
    Coupon, CustomerId, DiscountType, EstablishmentId, LoyaltyAccount, Money, Product, ProductId,
};
use serde::Deserialize;
use store::{CatalogStore, DEFAULT_TIER, OrderStore};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct ProductFields {
    pub establishment_id: EstablishmentId,
    pub name: String,
    pub price: Money,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CouponFields {
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    #[serde(default)]
    pub max_uses: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAccount {
    pub customer_id: CustomerId,
    pub tier: Option<String>,
    #[serde(default)]
    pub initial_points: i64,
}

// -- Handlers --

/// PUT /products/:id: create or replace a product.
#[tracing::instrument(skip(state, fields))]
pub async fn put_product<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(fields): Json<ProductFields>,
) -> Result<Json<Product>, ApiError> {
    let product = Product {
        id: parse_id::<ProductId>(&id)?,
        establishment_id: fields.establishment_id,
        name: fields.name,
        price: fields.price,
        active: fields.active,
    };
    state.catalog().upsert_product(product.clone()).await?;
    tracing::info!(establishment_id = %product.establishment_id, "product saved");
    Ok(Json(product))
}

/// PUT /coupons/:code: create or replace a coupon definition.
#[tracing::instrument(skip(state, fields))]
pub async fn put_coupon<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(code): Path<String>,
    Json(fields): Json<CouponFields>,
) -> Result<Json<Coupon>, ApiError> {
    if code.trim().is_empty() {
        return Err(ApiError::BadRequest("Coupon code must not be blank".to_string()));
    }
    let coupon = Coupon {
        code,
        discount_type: fields.discount_type,
        discount_value: fields.discount_value,
        valid_from: fields.valid_from,
        valid_until: fields.valid_until,
        max_uses: fields.max_uses,
    };
    state.catalog().upsert_coupon(coupon.clone()).await?;
    tracing::info!("coupon saved");
    Ok(Json(coupon))
}

/// POST /loyalty-accounts: open an account, or return the existing one
/// unchanged.
#[tracing::instrument(skip(state, req), fields(customer_id = %req.customer_id))]
pub async fn open_account<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<OpenAccount>,
) -> Result<Json<LoyaltyAccount>, ApiError> {
    let tier = req.tier.as_deref().unwrap_or(DEFAULT_TIER);
    let account = state
        .catalog()
        .open_loyalty_account(req.customer_id, tier, req.initial_points)
        .await?;
    Ok(Json(account))
}
