//! Establishment record management.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Establishment, EstablishmentFields, EstablishmentId};
use store::{CatalogStore, OrderStore};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

/// POST /establishments
#[tracing::instrument(skip(state, fields))]
pub async fn create<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(fields): Json<EstablishmentFields>,
) -> Result<(StatusCode, Json<Establishment>), ApiError> {
    let establishment = state.catalog().create_establishment(fields).await?;
    tracing::info!(id = %establishment.id, "establishment created");
    Ok((StatusCode::CREATED, Json(establishment)))
}

/// GET /establishments
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Establishment>>, ApiError> {
    Ok(Json(state.catalog().list_establishments().await?))
}

/// GET /establishments/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Establishment>, ApiError> {
    let establishment_id: EstablishmentId = parse_id(&id)?;
    state
        .catalog()
        .get_establishment(establishment_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Establishment {id} not found")))
}

/// PUT /establishments/:id: replace the editable fields.
#[tracing::instrument(skip(state, fields))]
pub async fn update<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(fields): Json<EstablishmentFields>,
) -> Result<Json<Establishment>, ApiError> {
    let establishment_id: EstablishmentId = parse_id(&id)?;
    state
        .catalog()
        .update_establishment(establishment_id, fields)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Establishment {id} not found")))
}

/// DELETE /establishments/:id: also removes the establishment's products.
#[tracing::instrument(skip(state))]
pub async fn delete<S: OrderStore + CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let establishment_id: EstablishmentId = parse_id(&id)?;
    if state.catalog().delete_establishment(establishment_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Establishment {id} not found")))
    }
}
