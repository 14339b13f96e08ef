//! Axum REST API: router, shared state and error rendering.

mod advances;
mod allocations;
mod distributions;
mod mentor_payments;
mod payments;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::config::Config;
use crate::directory::Directory;
use crate::errors::FundError;

pub struct ApiState {
    pub pool: SqlitePool,
    pub config: Config,
    pub directory: Arc<dyn Directory>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        // Payments
        .route(
            "/payments",
            post(payments::create_payment).get(payments::list_payments),
        )
        .route("/payments/overdue", get(payments::overdue_payments))
        .route("/payments/:id", get(payments::get_payment))
        .route("/payments/:id/confirm", post(payments::confirm_payment))
        .route("/payments/:id/cancel", post(payments::cancel_payment))
        .route("/payments/:id/status", put(payments::update_status))
        .route(
            "/projects/:id/payments/total-paid",
            get(payments::total_paid_for_project),
        )
        // Allocations
        .route(
            "/allocations",
            post(allocations::create_allocation).get(allocations::list_allocations),
        )
        .route(
            "/allocations/by-payment/:payment_id",
            get(allocations::get_allocation_by_payment),
        )
        .route("/allocations/:id", get(allocations::get_allocation))
        .route("/allocations/:id/summary", get(allocations::get_summary))
        .route("/allocations/:id/status", put(allocations::update_status))
        .route(
            "/allocations/:id/percentages",
            put(allocations::update_percentages),
        )
        .route(
            "/allocations/:id/recalculate",
            post(allocations::recalculate_amounts),
        )
        .route("/allocations/:id/ready", get(allocations::is_ready))
        .route(
            "/allocations/:id/fully-distributed",
            get(allocations::is_fully_distributed),
        )
        // Distributions
        .route(
            "/distributions",
            post(distributions::create_distribution).get(distributions::list_distributions),
        )
        .route("/distributions/:id", get(distributions::get_distribution))
        .route(
            "/distributions/:id/status",
            put(distributions::update_status),
        )
        .route("/distributions/:id/pay", post(distributions::mark_as_paid))
        .route("/distributions/:id/cancel", post(distributions::cancel))
        // Mentor payments
        .route(
            "/mentor-payments",
            post(mentor_payments::create_mentor_payment).get(mentor_payments::list_mentor_payments),
        )
        .route(
            "/mentor-payments/:id",
            get(mentor_payments::get_mentor_payment),
        )
        .route(
            "/mentor-payments/:id/approve",
            post(mentor_payments::approve),
        )
        .route("/mentor-payments/:id/pay", post(mentor_payments::mark_as_paid))
        .route("/mentor-payments/:id/cancel", post(mentor_payments::cancel))
        .route(
            "/mentors/:id/mentor-payments/total-paid",
            get(mentor_payments::total_paid_for_mentor),
        )
        // Lab fund advances
        .route(
            "/advances",
            post(advances::create_advance).get(advances::list_advances),
        )
        .route("/advances/outstanding", get(advances::total_outstanding))
        .route("/advances/:id", get(advances::get_advance))
        .route("/advances/:id/approve", post(advances::approve))
        .route("/advances/:id/settle", post(advances::settle))
        .route("/advances/:id/cancel", post(advances::cancel))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Shared request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// Body of the various `…/cancel` endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// JSON body extractor whose rejection is a [`FundError::Validation`], so
/// malformed input renders like every other error.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = FundError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| FundError::Validation(rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}

impl IntoResponse for FundError {
    fn into_response(self) -> Response {
        let status = match &self {
            FundError::NotFound { .. } => StatusCode::NOT_FOUND,
            FundError::InvalidState(_) | FundError::Conflict(_) => StatusCode::CONFLICT,
            FundError::InvariantViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FundError::Validation(_) => StatusCode::BAD_REQUEST,
            FundError::Unauthenticated => StatusCode::UNAUTHORIZED,
            FundError::Forbidden(_) => StatusCode::FORBIDDEN,
            FundError::CorruptRecord(_)
            | FundError::Database(_)
            | FundError::Migrate(_)
            | FundError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                kind: self.kind(),
            }),
        )
            .into_response()
    }
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
