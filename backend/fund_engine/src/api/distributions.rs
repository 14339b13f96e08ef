//! `/distributions` handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ApiJson, ApiState, CancelRequest};
use crate::auth::Actor;
use crate::distributions::{self, FundDistribution, NewDistribution};
use crate::errors::{FundError, Result};
use crate::payout::{PayoutDetails, PayoutStatusKind};

#[derive(Debug, Deserialize)]
pub struct DistributionQuery {
    pub allocation_id: Option<i64>,
    pub talent_id: Option<i64>,
}

#[derive(Serialize)]
pub struct DistributionsResponse {
    pub count: usize,
    pub distributions: Vec<FundDistribution>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: PayoutStatusKind,
    pub notes: Option<String>,
}

/// `POST /distributions`
pub async fn create_distribution(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    ApiJson(new): ApiJson<NewDistribution>,
) -> Result<(StatusCode, Json<FundDistribution>)> {
    actor.require_admin()?;
    let distribution = distributions::create_distribution(&state.pool, new).await?;
    Ok((StatusCode::CREATED, Json(distribution)))
}

/// `GET /distributions?allocation_id=&talent_id=`
///
/// At least one filter is required; with both, the intersection is returned.
pub async fn list_distributions(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Query(query): Query<DistributionQuery>,
) -> Result<Json<DistributionsResponse>> {
    let found = match (query.allocation_id, query.talent_id) {
        (Some(allocation_id), talent_id) => {
            distributions::distributions_for_allocation(&state.pool, allocation_id)
                .await?
                .into_iter()
                .filter(|d| talent_id.map_or(true, |t| d.talent_id == t))
                .collect()
        }
        (None, Some(talent_id)) => {
            distributions::distributions_for_talent(&state.pool, talent_id).await?
        }
        (None, None) => {
            return Err(FundError::Validation(
                "allocation_id or talent_id is required".to_string(),
            ))
        }
    };
    Ok(Json(DistributionsResponse {
        count: found.len(),
        distributions: found,
    }))
}

/// `GET /distributions/:id`
pub async fn get_distribution(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<FundDistribution>> {
    Ok(Json(distributions::get_distribution(&state.pool, id).await?))
}

/// `PUT /distributions/:id/status`
///
/// The caller is recorded as approver.
pub async fn update_status(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<UpdateStatusRequest>,
) -> Result<Json<FundDistribution>> {
    actor.require_admin()?;
    let distribution = distributions::update_status(
        &state.pool,
        id,
        body.status,
        Some(actor.user_id),
        body.notes,
    )
    .await?;
    Ok(Json(distribution))
}

/// `POST /distributions/:id/pay`
pub async fn mark_as_paid(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
    ApiJson(details): ApiJson<PayoutDetails>,
) -> Result<Json<FundDistribution>> {
    actor.require_admin()?;
    let today = Utc::now().date_naive();
    Ok(Json(
        distributions::mark_as_paid(&state.pool, id, details, today).await?,
    ))
}

/// `POST /distributions/:id/cancel`
pub async fn cancel(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<CancelRequest>,
) -> Result<Json<FundDistribution>> {
    actor.require_admin()?;
    Ok(Json(distributions::cancel(&state.pool, id, body.reason).await?))
}
