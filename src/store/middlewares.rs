//! Middleware rows. Read-only to the engine; inserts exist for operators.

use chrono::Utc;

use crate::store::models::{Middleware, NewMiddleware};
use crate::store::{decode_rows, Store, StoreResult};

impl Store {
    /// All middlewares ordered by id.
    pub async fn middlewares(&self) -> StoreResult<Vec<Middleware>> {
        let rows = sqlx::query(
            "SELECT id, name, type, config, created_at, updated_at FROM middlewares ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(decode_rows(rows, "middlewares"))
    }

    pub async fn insert_middleware(&self, new: &NewMiddleware) -> StoreResult<()> {
        let now = Utc::now();
        let config = serde_json::to_string(&new.config)?;
        sqlx::query(
            "INSERT INTO middlewares (id, name, type, config, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.id)
        .bind(&new.name)
        .bind(&new.kind)
        .bind(config)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
