//! `/mentor-payments` handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;

use super::{ApiJson, ApiState, CancelRequest};
use crate::auth::Actor;
use crate::errors::Result;
use crate::mentor_payments::{self, MentorPayment, MentorPaymentFilter, NewMentorPayment};
use crate::money::Money;
use crate::payout::PayoutDetails;

#[derive(Serialize)]
pub struct MentorPaymentsResponse {
    pub count: usize,
    pub mentor_payments: Vec<MentorPayment>,
}

#[derive(Serialize)]
pub struct MentorTotalResponse {
    pub mentor_id: i64,
    pub total_paid: Money,
}

/// `POST /mentor-payments`
pub async fn create_mentor_payment(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    ApiJson(new): ApiJson<NewMentorPayment>,
) -> Result<(StatusCode, Json<MentorPayment>)> {
    actor.require_admin()?;
    let payment = mentor_payments::create_from_allocation(&state.pool, new).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// `GET /mentor-payments?mentor_id=&project_id=&status=`
pub async fn list_mentor_payments(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Query(filter): Query<MentorPaymentFilter>,
) -> Result<Json<MentorPaymentsResponse>> {
    let found = mentor_payments::find_mentor_payments(&state.pool, &filter).await?;
    Ok(Json(MentorPaymentsResponse {
        count: found.len(),
        mentor_payments: found,
    }))
}

/// `GET /mentor-payments/:id`
pub async fn get_mentor_payment(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<MentorPayment>> {
    Ok(Json(
        mentor_payments::get_mentor_payment(&state.pool, id).await?,
    ))
}

/// `POST /mentor-payments/:id/approve`
pub async fn approve(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<MentorPayment>> {
    actor.require_admin()?;
    Ok(Json(
        mentor_payments::approve(&state.pool, id, actor.user_id).await?,
    ))
}

/// `POST /mentor-payments/:id/pay`
pub async fn mark_as_paid(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
    ApiJson(details): ApiJson<PayoutDetails>,
) -> Result<Json<MentorPayment>> {
    actor.require_admin()?;
    let today = Utc::now().date_naive();
    Ok(Json(
        mentor_payments::mark_as_paid(&state.pool, id, details, today).await?,
    ))
}

/// `POST /mentor-payments/:id/cancel`
pub async fn cancel(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<CancelRequest>,
) -> Result<Json<MentorPayment>> {
    actor.require_admin()?;
    Ok(Json(
        mentor_payments::cancel(&state.pool, id, body.reason).await?,
    ))
}

/// `GET /mentors/:id/mentor-payments/total-paid`
pub async fn total_paid_for_mentor(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Path(mentor_id): Path<i64>,
) -> Result<Json<MentorTotalResponse>> {
    let total_paid = mentor_payments::total_paid_for_mentor(&state.pool, mentor_id).await?;
    Ok(Json(MentorTotalResponse {
        mentor_id,
        total_paid,
    }))
}
