//! Resource rows and their assignment tables.

use std::collections::HashSet;

use chrono::Utc;
use sqlx::Row;

use crate::store::models::{
    MiddlewareAssignment, Resource, ResourceSighting, ResourceStatus, RouterProtocol,
    RoutingSettings, ServiceAssignment, DEFAULT_ENTRYPOINT, DEFAULT_ROUTER_PRIORITY, DEFAULT_TCP_ENTRYPOINT,
};
use crate::store::{decode_rows, Store, StoreError, StoreResult};

const RESOURCE_COLUMNS: &str = "id, host, service_id, status, source_type, protocol, entrypoints, \
     tls_domains, custom_headers, router_priority, tcp_enabled, tcp_entrypoints, \
     tcp_sni_rule, created_at, updated_at";

/// What an upsert did to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Was disabled, is active again.
    Reactivated,
    /// Host or service changed.
    Updated,
    Unchanged,
}

impl Store {
    /// All resources ordered by id.
    pub async fn resources(&self) -> StoreResult<Vec<Resource>> {
        let sql = format!("SELECT {} FROM resources ORDER BY id", RESOURCE_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(decode_rows(rows, "resources"))
    }

    /// Active resources ordered by id.
    pub async fn active_resources(&self) -> StoreResult<Vec<Resource>> {
        let sql = format!(
            "SELECT {} FROM resources WHERE status = ? ORDER BY id",
            RESOURCE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(ResourceStatus::Active.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(decode_rows(rows, "resources"))
    }

    pub async fn resource(&self, id: &str) -> StoreResult<Option<Resource>> {
        let sql = format!("SELECT {} FROM resources WHERE id = ?", RESOURCE_COLUMNS);
        let resource = sqlx::query_as::<_, Resource>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(resource)
    }

    /// Number of active resources.
    pub async fn count_active_resources(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM resources WHERE status = ?")
            .bind(ResourceStatus::Active.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Record an upstream sighting of a resource.
    ///
    /// An existing row only has `host`, `service_id`, `status` and
    /// `updated_at` touched. A new row gets the documented defaults; a TCP
    /// sighting is inserted with TCP routing enabled and its SNI rule.
    pub async fn upsert_discovered_resource(&self, found: &ResourceSighting) -> StoreResult<UpsertOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String, String, String)> =
            sqlx::query_as("SELECT host, service_id, status FROM resources WHERE id = ?")
                .bind(&found.id)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = match existing {
            Some((old_host, old_service, old_status)) => {
                let was_active = old_status == ResourceStatus::Active.as_str();
                if was_active && old_host == found.host && old_service == found.service_id {
                    UpsertOutcome::Unchanged
                } else {
                    sqlx::query(
                        "UPDATE resources SET host = ?, service_id = ?, status = ?, updated_at = ? \
                         WHERE id = ?",
                    )
                    .bind(&found.host)
                    .bind(&found.service_id)
                    .bind(ResourceStatus::Active.as_str())
                    .bind(now)
                    .bind(&found.id)
                    .execute(&mut *tx)
                    .await?;

                    if was_active {
                        UpsertOutcome::Updated
                    } else {
                        UpsertOutcome::Reactivated
                    }
                }
            }
            None => {
                let tcp = found.protocol == RouterProtocol::Tcp;
                let sni_rule = if tcp { found.sni_rule.trim() } else { "" };
                sqlx::query(
                    "INSERT INTO resources (id, host, service_id, status, source_type, protocol, \
                     entrypoints, tls_domains, custom_headers, router_priority, tcp_enabled, \
                     tcp_entrypoints, tcp_sni_rule, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, '', '{}', ?, ?, ?, ?, ?, ?)",
                )
                .bind(&found.id)
                .bind(&found.host)
                .bind(&found.service_id)
                .bind(ResourceStatus::Active.as_str())
                .bind(&found.source_type)
                .bind(found.protocol.as_str())
                .bind(DEFAULT_ENTRYPOINT)
                .bind(DEFAULT_ROUTER_PRIORITY)
                .bind(tcp)
                .bind(DEFAULT_TCP_ENTRYPOINT)
                .bind(sni_rule)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                UpsertOutcome::Inserted
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Disable every active resource whose id is not in `keep`.
    ///
    /// Returns the ids that were disabled. Rows are never deleted here.
    pub async fn disable_resources_except(&self, keep: &HashSet<String>) -> StoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM resources WHERE status = ? ORDER BY id")
            .bind(ResourceStatus::Active.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut stale = Vec::new();
        for row in rows {
            match row.try_get::<String, _>("id") {
                Ok(id) if !keep.contains(&id) => stale.push(id),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Skipping resource row with unreadable id"),
            }
        }

        let now = Utc::now();
        let mut disabled = Vec::with_capacity(stale.len());
        for id in stale {
            let result = sqlx::query(
                "UPDATE resources SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            )
            .bind(ResourceStatus::Disabled.as_str())
            .bind(now)
            .bind(&id)
            .bind(ResourceStatus::Active.as_str())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                disabled.push(id);
            }
        }
        Ok(disabled)
    }

    /// Replace the operator-owned fields of a resource.
    pub async fn update_routing(&self, id: &str, settings: &RoutingSettings) -> StoreResult<()> {
        let headers = serde_json::to_string(&settings.custom_headers)?;
        let result = sqlx::query(
            "UPDATE resources SET entrypoints = ?, tls_domains = ?, custom_headers = ?, \
             router_priority = ?, tcp_enabled = ?, tcp_entrypoints = ?, tcp_sni_rule = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(&settings.entrypoints)
        .bind(&settings.tls_domains)
        .bind(headers)
        .bind(settings.router_priority)
        .bind(settings.tcp_enabled)
        .bind(&settings.tcp_entrypoints)
        .bind(&settings.tcp_sni_rule)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "resource",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Hard delete, allowed only for disabled resources. Assignments go with it.
    pub async fn delete_resource(&self, id: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let status: Option<(String,)> = sqlx::query_as("SELECT status FROM resources WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        match status {
            None => {
                return Err(StoreError::NotFound {
                    entity: "resource",
                    id: id.to_string(),
                })
            }
            Some((status,)) if status != ResourceStatus::Disabled.as_str() => {
                return Err(StoreError::ResourceNotDisabled(id.to_string()));
            }
            Some(_) => {}
        }

        sqlx::query("DELETE FROM resource_middlewares WHERE resource_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM resource_services WHERE resource_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM resources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(resource_id = id, "Resource deleted");
        Ok(())
    }

    /// Attach a middleware. Re-assigning replaces the previous priority.
    pub async fn assign_middleware(
        &self,
        resource_id: &str,
        middleware_id: &str,
        priority: i64,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM resource_middlewares WHERE resource_id = ? AND middleware_id = ?")
            .bind(resource_id)
            .bind(middleware_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO resource_middlewares (resource_id, middleware_id, priority) VALUES (?, ?, ?)",
        )
        .bind(resource_id)
        .bind(middleware_id)
        .bind(priority)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Returns false when nothing was attached.
    pub async fn remove_middleware(&self, resource_id: &str, middleware_id: &str) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM resource_middlewares WHERE resource_id = ? AND middleware_id = ?")
                .bind(resource_id)
                .bind(middleware_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Assignments that point at an existing middleware, grouped by
    /// resource and ordered by descending priority, ties by middleware id.
    pub async fn middleware_assignments(&self) -> StoreResult<Vec<MiddlewareAssignment>> {
        let rows = sqlx::query(
            "SELECT rm.resource_id, rm.middleware_id, rm.priority \
             FROM resource_middlewares rm \
             JOIN middlewares m ON m.id = rm.middleware_id \
             ORDER BY rm.resource_id, rm.priority DESC, rm.middleware_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(decode_rows(rows, "resource_middlewares"))
    }

    /// Set the custom service of a resource, replacing any previous one.
    pub async fn assign_service(&self, resource_id: &str, service_id: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM resource_services WHERE resource_id = ?")
            .bind(resource_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO resource_services (resource_id, service_id) VALUES (?, ?)")
            .bind(resource_id)
            .bind(service_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_service_assignment(&self, resource_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM resource_services WHERE resource_id = ?")
            .bind(resource_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Custom service assignments that point at an existing service.
    pub async fn service_assignments(&self) -> StoreResult<Vec<ServiceAssignment>> {
        let rows = sqlx::query(
            "SELECT rs.resource_id, rs.service_id FROM resource_services rs \
             JOIN services s ON s.id = rs.service_id ORDER BY rs.resource_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(decode_rows(rows, "resource_services"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::NewMiddleware;
    use serde_json::json;

    async fn store_with_resource() -> Store {
        let store = Store::in_memory().await.unwrap();
        store
            .upsert_discovered_resource(&ResourceSighting::http("r1", "app.example.com", "r1-service", "gateway"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_uses_defaults() {
        let store = store_with_resource().await;
        let r = store.resource("r1").await.unwrap().unwrap();
        assert_eq!(r.status, ResourceStatus::Active);
        assert_eq!(r.entrypoints, "websecure");
        assert_eq!(r.tcp_entrypoints, "tcp");
        assert_eq!(r.tls_domains, "");
        assert!(r.headers().unwrap().is_empty());
        assert_eq!(r.router_priority, 100);
        assert!(!r.tcp_enabled);
        assert_eq!(r.protocol, RouterProtocol::Http);
        assert_eq!(r.source_type, "gateway");
    }

    #[tokio::test]
    async fn test_tcp_sighting_enables_tcp_routing() {
        let store = Store::in_memory().await.unwrap();
        let sighting = ResourceSighting::tcp("db", "db.example.com", "db@docker", "proxy-api", "HostSNI(`db.example.com`)");
        store.upsert_discovered_resource(&sighting).await.unwrap();

        let db = store.resource("db").await.unwrap().unwrap();
        assert_eq!(db.protocol, RouterProtocol::Tcp);
        assert!(db.tcp_enabled);
        assert!(!db.routes_http());
        assert_eq!(db.tcp_sni_rule, "HostSNI(`db.example.com`)");

        // Operator settings survive later sightings.
        let routing = RoutingSettings {
            tcp_enabled: true,
            tcp_sni_rule: "HostSNI(`*`)".into(),
            ..RoutingSettings::default()
        };
        store.update_routing("db", &routing).await.unwrap();
        let outcome = store.upsert_discovered_resource(&sighting).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(store.resource("db").await.unwrap().unwrap().tcp_sni_rule, "HostSNI(`*`)");
    }

    #[tokio::test]
    async fn test_count_active_resources() {
        let store = store_with_resource().await;
        store
            .upsert_discovered_resource(&ResourceSighting::http("r2", "b.example.com", "r2-service", "gateway"))
            .await
            .unwrap();
        assert_eq!(store.count_active_resources().await.unwrap(), 2);

        let keep: HashSet<String> = ["r2".to_string()].into_iter().collect();
        store.disable_resources_except(&keep).await.unwrap();
        assert_eq!(store.count_active_resources().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_outcomes() {
        let store = store_with_resource().await;

        let same = store
            .upsert_discovered_resource(&ResourceSighting::http("r1", "app.example.com", "r1-service", "gateway"))
            .await
            .unwrap();
        assert_eq!(same, UpsertOutcome::Unchanged);

        let moved = store
            .upsert_discovered_resource(&ResourceSighting::http("r1", "new.example.com", "r1-service", "gateway"))
            .await
            .unwrap();
        assert_eq!(moved, UpsertOutcome::Updated);

        store.disable_resources_except(&HashSet::new()).await.unwrap();
        let back = store
            .upsert_discovered_resource(&ResourceSighting::http("r1", "new.example.com", "r1-service", "gateway"))
            .await
            .unwrap();
        assert_eq!(back, UpsertOutcome::Reactivated);
    }

    #[tokio::test]
    async fn test_delete_requires_disabled() {
        let store = store_with_resource().await;

        let err = store.delete_resource("r1").await.unwrap_err();
        assert!(matches!(err, StoreError::ResourceNotDisabled(_)));

        store.disable_resources_except(&HashSet::new()).await.unwrap();
        store.delete_resource("r1").await.unwrap();
        assert!(store.resource("r1").await.unwrap().is_none());

        let err = store.delete_resource("r1").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_reassigning_middleware_keeps_one_row() {
        let store = store_with_resource().await;
        store
            .insert_middleware(&NewMiddleware {
                id: "auth".into(),
                name: "Auth".into(),
                kind: "basicAuth".into(),
                config: json!({"users": ["u:p"]}),
            })
            .await
            .unwrap();

        store.assign_middleware("r1", "auth", 10).await.unwrap();
        store.assign_middleware("r1", "auth", 70).await.unwrap();

        let assignments = store.middleware_assignments().await.unwrap();
        assert_eq!(
            assignments,
            vec![MiddlewareAssignment {
                resource_id: "r1".into(),
                middleware_id: "auth".into(),
                priority: 70,
            }]
        );
    }

    #[tokio::test]
    async fn test_update_routing_unknown_resource() {
        let store = Store::in_memory().await.unwrap();
        let err = store
            .update_routing("nope", &RoutingSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "resource", .. }));
    }
}
