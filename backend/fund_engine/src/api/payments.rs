//! `/payments` handlers.

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
use crate::errors::Result;
use crate::money::Money;
use crate::payments::{self, NewPayment, Payment, PaymentFilter, PaymentStatusKind};

#[derive(Serialize)]
pub struct PaymentsResponse {
    pub count: usize,
    pub payments: Vec<Payment>,
}

impl From<Vec<Payment>> for PaymentsResponse {
    fn from(payments: Vec<Payment>) -> Self {
        PaymentsResponse {
            count: payments.len(),
            payments,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: PaymentStatusKind,
    pub transaction_reference: Option<String>,
}

#[derive(Serialize)]
pub struct ProjectTotalResponse {
    pub project_id: i64,
    pub total_paid: Money,
}

/// `POST /payments`
pub async fn create_payment(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    ApiJson(new): ApiJson<NewPayment>,
) -> Result<(StatusCode, Json<Payment>)> {
    let payment = payments::create_payment(&state.pool, new).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// `GET /payments?project_id=&company_id=&status=`
pub async fn list_payments(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Query(filter): Query<PaymentFilter>,
) -> Result<Json<PaymentsResponse>> {
    let found = payments::find_payments(&state.pool, &filter).await?;
    Ok(Json(found.into()))
}

/// `GET /payments/overdue`
pub async fn overdue_payments(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
) -> Result<Json<PaymentsResponse>> {
    let today = Utc::now().date_naive();
    let found = payments::overdue_payments(&state.pool, today).await?;
    Ok(Json(found.into()))
}

/// `GET /payments/:id`
pub async fn get_payment(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Payment>> {
    Ok(Json(payments::get_payment(&state.pool, id).await?))
}

/// `POST /payments/:id/confirm`
pub async fn confirm_payment(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Payment>> {
    actor.require_admin()?;
    Ok(Json(payments::confirm_payment(&state.pool, id).await?))
}

/// `POST /payments/:id/cancel`
pub async fn cancel_payment(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<CancelRequest>,
) -> Result<Json<Payment>> {
    actor.require_admin()?;
    Ok(Json(
        payments::cancel_payment(&state.pool, id, body.reason).await?,
    ))
}

/// `PUT /payments/:id/status`
pub async fn update_status(
    State(state): State<Arc<ApiState>>,
    actor: Actor,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<UpdateStatusRequest>,
) -> Result<Json<Payment>> {
    actor.require_admin()?;
    let payment =
        payments::update_status(&state.pool, id, body.status, body.transaction_reference).await?;
    Ok(Json(payment))
}

/// `GET /projects/:id/payments/total-paid`
pub async fn total_paid_for_project(
    State(state): State<Arc<ApiState>>,
    _actor: Actor,
    Path(project_id): Path<i64>,
) -> Result<Json<ProjectTotalResponse>> {
    let total_paid = payments::total_paid_for_project(&state.pool, project_id).await?;
    Ok(Json(ProjectTotalResponse {
        project_id,
        total_paid,
    }))
}
