//! HTTP API server with observability for the order engine.
//!
//! Provides REST endpoints for building, committing and transitioning
//! orders and for managing establishments and the catalog they sell from,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::{EngineConfig, OrderService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{CatalogStore, OrderStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore> {
    pub order_service: OrderService<S>,
}

impl<S: OrderStore + CatalogStore> AppState<S> {
    /// Record management goes straight to the store.
    pub fn catalog(&self) -> &S {
        self.order_service.store()
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router
where
    S: OrderStore + CatalogStore + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/quote", post(routes::orders::quote::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/transition",
            post(routes::orders::transition::<S>),
        )
        .route("/orders/{id}/events", get(routes::orders::events::<S>))
        .route("/orders/{id}/history", get(routes::orders::history::<S>))
        .route(
            "/establishments",
            post(routes::establishments::create::<S>).get(routes::establishments::list::<S>),
        )
        .route(
            "/establishments/{id}",
            get(routes::establishments::get::<S>)
                .put(routes::establishments::update::<S>)
                .delete(routes::establishments::delete::<S>),
        )
        .route("/products/{id}", put(routes::catalog::put_product::<S>))
        .route("/coupons/{code}", put(routes::catalog::put_coupon::<S>))
        .route(
            "/loyalty-accounts",
            post(routes::catalog::open_account::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `store`.
pub fn create_default_state<S: OrderStore>(store: S, engine: EngineConfig) -> Arc<AppState<S>> {
    Arc::new(AppState {
        order_service: OrderService::with_config(store, engine),
    })
}
