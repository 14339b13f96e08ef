//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FundError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing caller identity")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A stored row whose columns do not describe a legal state.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FundError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Short machine-readable kind, echoed in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::Conflict(_) => "conflict",
            Self::Validation(_) => "validation_error",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::CorruptRecord(_) | Self::Database(_) | Self::Migrate(_) | Self::Config(_) => {
                "internal"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, FundError>;
