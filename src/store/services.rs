//! Service rows.

use chrono::Utc;
use serde_json::Value;

use crate::naming::{with_suffix, ProviderSuffix};
use crate::store::models::{NewService, Service, ServiceType};
use crate::store::{decode_rows, Store, StoreError, StoreResult};

const SERVICE_COLUMNS: &str = "id, name, type, config, source_type, created_at, updated_at";

impl Store {
    /// All services ordered by id.
    pub async fn services(&self) -> StoreResult<Vec<Service>> {
        let sql = format!("SELECT {} FROM services ORDER BY id", SERVICE_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(decode_rows(rows, "services"))
    }

    pub async fn service(&self, id: &str) -> StoreResult<Option<Service>> {
        let sql = format!("SELECT {} FROM services WHERE id = ?", SERVICE_COLUMNS);
        let service = sqlx::query_as::<_, Service>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(service)
    }

    /// Find the row for a normalized service key.
    ///
    /// Tries the bare key, then the key with `default_suffix`, then any row
    /// whose id is the key followed by some other provider suffix.
    pub async fn find_service(
        &self,
        key: &str,
        default_suffix: ProviderSuffix,
    ) -> StoreResult<Option<Service>> {
        if let Some(service) = self.service(key).await? {
            return Ok(Some(service));
        }
        if let Some(service) = self.service(&with_suffix(key, default_suffix)).await? {
            return Ok(Some(service));
        }

        // substr keeps `_` and `%` in ids literal, unlike LIKE.
        let prefix = format!("{}@", key);
        let sql = format!(
            "SELECT {} FROM services WHERE substr(id, 1, ?) = ? ORDER BY id LIMIT 1",
            SERVICE_COLUMNS
        );
        let service = sqlx::query_as::<_, Service>(&sql)
            .bind(prefix.chars().count() as i64)
            .bind(&prefix)
            .fetch_optional(&self.pool)
            .await?;
        Ok(service)
    }

    pub async fn insert_service(&self, new: &NewService) -> StoreResult<()> {
        let now = Utc::now();
        let config = serde_json::to_string(&new.config)?;
        sqlx::query(
            "INSERT INTO services (id, name, type, config, source_type, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.id)
        .bind(&new.name)
        .bind(new.kind.as_str())
        .bind(config)
        .bind(&new.source_type)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace the type and config of a service. Name and source are kept.
    pub async fn update_service_definition(
        &self,
        id: &str,
        kind: ServiceType,
        config: &Value,
    ) -> StoreResult<()> {
        let config = serde_json::to_string(config)?;
        let result = sqlx::query("UPDATE services SET type = ?, config = ?, updated_at = ? WHERE id = ?")
            .bind(kind.as_str())
            .bind(config)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "service",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_service(id: &str) -> NewService {
        NewService {
            id: id.to_string(),
            name: id.to_string(),
            kind: ServiceType::LoadBalancer,
            config: json!({"servers": [{"url": "http://10.0.0.1:80"}]}),
            source_type: "gateway".into(),
        }
    }

    #[tokio::test]
    async fn test_find_service_lookup_order() {
        let store = Store::in_memory().await.unwrap();
        store.insert_service(&new_service("api@docker")).await.unwrap();

        // Prefix match catches a row created under another suffix.
        let found = store.find_service("api", ProviderSuffix::Http).await.unwrap().unwrap();
        assert_eq!(found.id, "api@docker");

        // The default-suffixed id wins over the prefix match.
        store.insert_service(&new_service("api@http")).await.unwrap();
        let found = store.find_service("api", ProviderSuffix::Http).await.unwrap().unwrap();
        assert_eq!(found.id, "api@http");

        // The bare id wins over everything.
        store.insert_service(&new_service("api")).await.unwrap();
        let found = store.find_service("api", ProviderSuffix::Http).await.unwrap().unwrap();
        assert_eq!(found.id, "api");
    }

    #[tokio::test]
    async fn test_find_service_does_not_treat_underscore_as_wildcard() {
        let store = Store::in_memory().await.unwrap();
        store.insert_service(&new_service("a-b@http")).await.unwrap();

        assert!(store.find_service("a_b", ProviderSuffix::File).await.unwrap().is_none());
        assert!(store.find_service("a", ProviderSuffix::File).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_definition() {
        let store = Store::in_memory().await.unwrap();
        store.insert_service(&new_service("s1@http")).await.unwrap();

        let config = json!({"service": "a@file", "fallback": "b@file"});
        store
            .update_service_definition("s1@http", ServiceType::Failover, &config)
            .await
            .unwrap();

        let row = store.service("s1@http").await.unwrap().unwrap();
        assert_eq!(row.service_type().unwrap(), ServiceType::Failover);
        assert_eq!(row.config_value().unwrap(), config);
        assert_eq!(row.name, "s1@http");

        let err = store
            .update_service_definition("missing", ServiceType::Weighted, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "service", .. }));
    }
}
