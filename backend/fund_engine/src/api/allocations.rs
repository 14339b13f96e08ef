//! `/allocations` handlers.  Every mutation here is administrator-only.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiJson, ApiState};
use crate::allocations::{self, AllocationStatusKind, FundAllocation, NewAllocation};
use crate::auth::Actor;
use crate::distributions;
use crate::errors::Result;
use crate::split::Percentages;
use crate::summary::{self, AllocationSummary};

#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    pub project_id: i64,
}

#[derive(Serialize)]
pub struct AllocationsResponse {
    pub project_id: i64,
    pub count: usize,
    pub allocations: Vec<FundAllocation>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AllocationStatusKind,
    pub notes: Option<String>,
}

#[derive(Serialize)]
pub struct FlagResponse {
    pub allocation_id: i64,
    pub value: bool,
}

/// `POST /allocations`
pub async fn create_allocation(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    ApiJson(new): ApiJson<NewAllocation>,
) -> Result<(StatusCode, Json<FundAllocation>)> {
    actor.require_admin()?;
    let allocation =
        allocations::create_allocation(&state.pool, new, &state.config.default_percentages)
            .await?;
    Ok((StatusCode::CREATED, Json(allocation)))
}

/// `GET /allocations?project_id=`
pub async fn list_allocations(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<AllocationsResponse>> {
    let found = allocations::allocations_for_project(&state.pool, query.project_id).await?;
    Ok(Json(AllocationsResponse {
        project_id: query.project_id,
        count: found.len(),
        allocations: found,
    }))
}

/// `GET /allocations/by-payment/:payment_id`
pub async fn get_allocation_by_payment(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Path(payment_id): Path<i64>,
) -> Result<Json<FundAllocation>> {
    Ok(Json(
        allocations::get_allocation_by_payment(&state.pool, payment_id).await?,
    ))
}

/// `GET /allocations/:id`
pub async fn get_allocation(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<FundAllocation>> {
    Ok(Json(allocations::get_allocation(&state.pool, id).await?))
}

/// `GET /allocations/:id/summary`
pub async fn get_summary(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<AllocationSummary>> {
    let view = summary::allocation_summary(&state.pool, state.directory.as_ref(), id).await?;
    Ok(Json(view))
}

/// `PUT /allocations/:id/status`
pub async fn update_status(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<UpdateStatusRequest>,
) -> Result<Json<FundAllocation>> {
    actor.require_admin()?;
    let allocation = allocations::update_status(
        &state.pool,
        id,
        body.status,
        Some(actor.user_id),
        body.notes,
    )
    .await?;
    Ok(Json(allocation))
}

/// `PUT /allocations/:id/percentages`
pub async fn update_percentages(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
    ApiJson(percentages): ApiJson<Percentages>,
) -> Result<Json<FundAllocation>> {
    actor.require_admin()?;
    Ok(Json(
        allocations::update_percentages(&state.pool, id, percentages).await?,
    ))
}

/// `POST /allocations/:id/recalculate`
pub async fn recalculate_amounts(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<FundAllocation>> {
    actor.require_admin()?;
    Ok(Json(allocations::recalculate_amounts(&state.pool, id).await?))
}

/// `GET /allocations/:id/ready`
pub async fn is_ready(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<FlagResponse>> {
    let value = allocations::is_ready_for_distribution(&state.pool, id).await?;
    Ok(Json(FlagResponse {
        allocation_id: id,
        value,
    }))
}

/// `GET /allocations/:id/fully-distributed`
pub async fn is_fully_distributed(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<FlagResponse>> {
    let value = distributions::is_fully_distributed(&state.pool, id).await?;
    Ok(Json(FlagResponse {
        allocation_id: id,
        value,
    }))
}
