//! `/advances` handlers.  Mutations are administrator-only.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiJson, ApiState, CancelRequest};
use crate::advances::{self, AdvanceFilter, LabFundAdvance, NewAdvance};
use crate::auth::Actor;
use crate::errors::Result;
use crate::money::Money;

#[derive(Serialize)]
pub struct AdvancesResponse {
    pub count: usize,
    pub advances: Vec<LabFundAdvance>,
}

#[derive(Debug, Deserialize)]
pub struct OutstandingQuery {
    pub project_id: Option<i64>,
}

#[derive(Serialize)]
pub struct OutstandingResponse {
    pub project_id: Option<i64>,
    pub total_outstanding: Money,
}

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub payment_id: i64,
}

/// `POST /advances`
pub async fn create_advance(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    ApiJson(new): ApiJson<NewAdvance>,
) -> Result<(StatusCode, Json<LabFundAdvance>)> {
    actor.require_admin()?;
    let advance = advances::create_advance(&state.pool, new).await?;
    Ok((StatusCode::CREATED, Json(advance)))
}

/// `GET /advances?project_id=&status=`
pub async fn list_advances(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Query(filter): Query<AdvanceFilter>,
) -> Result<Json<AdvancesResponse>> {
    let found = advances::find_advances(&state.pool, &filter).await?;
    Ok(Json(AdvancesResponse {
        count: found.len(),
        advances: found,
    }))
}

/// `GET /advances/outstanding?project_id=`
pub async fn total_outstanding(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Query(query): Query<OutstandingQuery>,
) -> Result<Json<OutstandingResponse>> {
    let total_outstanding = advances::total_outstanding(&state.pool, query.project_id).await?;
    Ok(Json(OutstandingResponse {
        project_id: query.project_id,
        total_outstanding,
    }))
}

/// `GET /advances/:id`
pub async fn get_advance(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<LabFundAdvance>> {
    Ok(Json(advances::get_advance(&state.pool, id).await?))
}

/// `POST /advances/:id/approve`
pub async fn approve(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<LabFundAdvance>> {
    actor.require_admin()?;
    Ok(Json(advances::approve(&state.pool, id, actor.user_id).await?))
}

/// `POST /advances/:id/settle`
pub async fn settle(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<SettleRequest>,
) -> Result<Json<LabFundAdvance>> {
    actor.require_admin()?;
    let advance = advances::settle(
        &state.pool,
        id,
        body.payment_id,
        state.config.require_advance_approval,
    )
    .await?;
    Ok(Json(advance))
}

/// `POST /advances/:id/cancel`
pub async fn cancel(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<CancelRequest>,
) -> Result<Json<LabFundAdvance>> {
    actor.require_admin()?;
    Ok(Json(advances::cancel(&state.pool, id, body.reason).await?))
}
