//! Database layer — pool setup, migrations and error classification.
//!
//! Every state change in the engine is a single conditional statement
//! (`UPDATE … WHERE status IN (…)` or `INSERT … SELECT … WHERE <guard>`), so
//! SQLite's single-writer lock makes each one an atomic read-validate-write.
//! The team bucket cap is enforced by a trigger (see the migrations);
//! the helpers at the bottom of this file turn its aborts into domain
//! errors.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::Result;

/// Message raised by the `fund_distributions_team_cap` trigger.
pub const TEAM_BUCKET_EXCEEDED: &str = "team bucket exceeded";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Establish a SQLite connection pool and run pending migrations.
///
/// In-memory databases live only as long as their connection, so they are
/// pinned to a single connection that is never recycled.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let in_memory = url.contains(":memory:") || url.contains("mode=memory");

    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
        .journal_mode(if in_memory {
            SqliteJournalMode::Memory
        } else {
            SqliteJournalMode::Wal
        });

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?
    };

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

/// Render a fixed set of status names as a SQL `IN` list body.
///
/// Only ever called with `as_str()` values of the status enums, never with
/// caller input.
pub(crate) fn status_list(statuses: &[&'static str]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

// ─────────────────────────────────────────────────────────
// Error classification
// ─────────────────────────────────────────────────────────

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// True when `err` is a `RAISE(ABORT, message)` from one of our triggers.
pub(crate) fn is_trigger_abort(err: &sqlx::Error, message: &str) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains(message))
}
