//! Order service: the engine's public operations over an injected store.

use std::time::Instant;

use chrono::Utc;
use common::{Order, OrderEvent, OrderId, OrderItem};
use store::{OrderStore, OrderStoreExt, StoreError};

use crate::audit::OrderHistory;
use crate::builder::{OrderBuilder, OrderDraft, OrderRequest};
use crate::config::EngineConfig;
use crate::error::{OrderError, Result};
use crate::ledger;
use crate::state_machine::{self, Transition};

/// Service for building, committing and transitioning orders.
///
/// Every storage call runs under the configured timeout. Each commit and
/// each transition is applied to the store as one unit of work.
pub struct OrderService<S: OrderStore> {
    store: S,
    config: EngineConfig,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a service with the default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates and prices a request without persisting anything.
    #[tracing::instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn build_order(&self, request: OrderRequest) -> Result<OrderDraft> {
        OrderBuilder::new(&self.store, &self.config)
            .build(request, Utc::now())
            .await
    }

    /// Commits a draft together with its coupon and loyalty side effects.
    #[tracing::instrument(skip(self, draft), fields(order_id = %draft.order.id))]
    pub async fn commit_order(&self, draft: OrderDraft) -> Result<Order> {
        let started = Instant::now();
        let unit = ledger::plan_commit(&draft, Utc::now())?;

        let result = self.config.bounded(self.store.apply(unit)).await;
        metrics::histogram!("order_commit_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(applied) => {
                metrics::counter!("orders_committed_total").increment(1);
                tracing::info!(
                    total = %applied.order.total,
                    events = applied.events.len(),
                    "order committed"
                );
                Ok(applied.order)
            }
            Err(e) => {
                let err = OrderError::from(e);
                metrics::counter!("order_commit_rejected_total", "reason" => err.kind())
                    .increment(1);
                tracing::warn!(error = %err, "order commit rejected");
                Err(err)
            }
        }
    }

    /// Builds and commits in one call.
    pub async fn place_order(&self, request: OrderRequest) -> Result<Order> {
        let draft = self.build_order(request).await?;
        self.commit_order(draft).await
    }

    /// Moves an order to a new status, applying the ledger effects of that
    /// status.
    ///
    /// The change only applies if the order still has the status it was
    /// loaded with. When another request got there first, the caller sees
    /// `InvalidTransition` if the new status no longer allows the change and
    /// `Conflict` if it does.
    #[tracing::instrument(skip(self, transition), fields(to = %transition.status))]
    pub async fn transition_order(&self, order_id: OrderId, transition: Transition) -> Result<Order> {
        let current = self
            .config
            .bounded(self.store.get_order(order_id))
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        let now = Utc::now();
        let (next, change) = state_machine::apply(&current, &transition, now)?;
        let unit = ledger::plan_transition(&current, next, change, &self.config, now)?;

        match self.config.bounded(self.store.apply(unit)).await {
            Ok(applied) => {
                metrics::counter!("order_transitions_total", "status" => transition.status.as_str())
                    .increment(1);
                tracing::info!(from = %current.status, "order status changed");
                Ok(applied.order)
            }
            Err(StoreError::StatusMismatch { actual, .. })
                if !actual.can_transition_to(transition.status) =>
            {
                tracing::warn!(%actual, "transition lost a race");
                Err(OrderError::InvalidTransition {
                    from: actual,
                    to: transition.status,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Loads an order with its items.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<(Order, Vec<OrderItem>)> {
        self.config
            .bounded(self.store.load_order(order_id))
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    /// Returns an order's audit trail in replay order.
    #[tracing::instrument(skip(self))]
    pub async fn order_events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>> {
        let events = self
            .config
            .bounded(self.store.get_order_events(order_id))
            .await?;
        if events.is_empty() {
            return Err(OrderError::NotFound(order_id));
        }
        Ok(events)
    }

    /// Rebuilds an order's history from its audit trail.
    #[tracing::instrument(skip(self))]
    pub async fn order_history(&self, order_id: OrderId) -> Result<OrderHistory> {
        let events = self.order_events(order_id).await?;
        OrderHistory::replay(&events)
    }
}
