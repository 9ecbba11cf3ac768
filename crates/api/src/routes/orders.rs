//! Order endpoints: quote, place, read, transition and audit trail.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Order, OrderEvent, OrderId, OrderItem};
use domain::{OrderHistory, OrderRequest, PriceBreakdown, Transition};
use serde::Serialize;
use store::{CatalogStore, OrderStore};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Serialize)]
pub struct QuoteResponse {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub price: PriceBreakdown,
}

// -- Handlers --

/// POST /orders/quote: validate and price a request without committing it.
#[tracing::instrument(skip(state, req))]
pub async fn quote<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<OrderRequest>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let draft = state.order_service.build_order(req).await?;
    let price = draft.price();
    Ok(Json(QuoteResponse {
        order: draft.order,
        items: draft.items,
        price,
    }))
}

/// POST /orders: build and commit an order.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<OrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let draft = state.order_service.build_order(req).await?;
    let items = draft.items.clone();
    let order = state.order_service.commit_order(draft).await?;

    Ok((StatusCode::CREATED, Json(OrderResponse { order, items })))
}

/// GET /orders/:id: load an order with its items.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let (order, items) = state.order_service.get_order(order_id).await?;
    Ok(Json(OrderResponse { order, items }))
}

/// POST /orders/:id/transition: move an order to a new status.
#[tracing::instrument(skip(state, transition))]
pub async fn transition<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(transition): Json<Transition>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let order = state
        .order_service
        .transition_order(order_id, transition)
        .await?;
    Ok(Json(order))
}

/// GET /orders/:id/events: list an order's audit trail.
#[tracing::instrument(skip(state))]
pub async fn events<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderEvent>>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    Ok(Json(state.order_service.order_events(order_id).await?))
}

/// GET /orders/:id/history: status timeline and ledger totals rebuilt from
/// the audit trail.
#[tracing::instrument(skip(state))]
pub async fn history<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderHistory>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    Ok(Json(state.order_service.order_history(order_id).await?))
}
