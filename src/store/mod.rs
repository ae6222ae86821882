//! Data Store.
//!
//! # Data Flow
//! ```text
//! Resource/Service watchers ──upsert/disable──▶ ┌────────┐
//! Operator (CLI / admin API) ──assign/edit───▶ │ SQLite │ ◀──read── Config generator
//!                                               └────────┘
//! ```
//!
//! # Design Decisions
//! - Runtime-checked queries, no build-time database
//! - Every multi-statement write runs in one transaction
//! - Bulk reads decode row by row; a row that fails to decode is logged and
//!   skipped instead of failing the whole read

pub mod middlewares;
pub mod models;
pub mod resources;
pub mod schema;
pub mod services;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::FromRow;
use thiserror::Error;

pub use models::{
    Middleware, MiddlewareAssignment, NewMiddleware, NewService, Resource, ResourceSighting,
    ResourceStatus, RouterProtocol, RoutingSettings, Service, ServiceAssignment, ServiceType,
};
pub use resources::UpsertOutcome;

/// Errors raised by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("resource '{0}' must be disabled before it can be deleted")]
    ResourceNotDisabled(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Handle to the relational store. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect and make sure the schema exists.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(url, "Store ready");
        Ok(store)
    }

    /// Private in-memory database on a single connection.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> StoreResult<()> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Decode rows, logging and skipping those that fail.
pub(crate) fn decode_rows<T>(rows: Vec<SqliteRow>, table: &'static str) -> Vec<T>
where
    T: for<'r> FromRow<'r, SqliteRow>,
{
    let mut decoded = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        match T::from_row(row) {
            Ok(item) => decoded.push(item),
            Err(e) => {
                tracing::warn!(table, row = index, error = %e, "Skipping row that failed to decode");
            }
        }
    }
    decoded
}
