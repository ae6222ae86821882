//! Table definitions, applied idempotently at startup.

pub const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS middlewares (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        type        TEXT NOT NULL,
        config      TEXT NOT NULL DEFAULT '{}',
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS services (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        type        TEXT NOT NULL,
        config      TEXT NOT NULL DEFAULT '{}',
        source_type TEXT NOT NULL DEFAULT '',
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS resources (
        id              TEXT PRIMARY KEY,
        host            TEXT NOT NULL,
        service_id      TEXT NOT NULL,
        status          TEXT NOT NULL DEFAULT 'active',
        source_type     TEXT NOT NULL DEFAULT '',
        protocol        TEXT NOT NULL DEFAULT 'http',
        entrypoints     TEXT NOT NULL DEFAULT 'websecure',
        tls_domains     TEXT NOT NULL DEFAULT '',
        custom_headers  TEXT NOT NULL DEFAULT '{}',
        router_priority INTEGER NOT NULL DEFAULT 100,
        tcp_enabled     INTEGER NOT NULL DEFAULT 0,
        tcp_entrypoints TEXT NOT NULL DEFAULT 'tcp',
        tcp_sni_rule    TEXT NOT NULL DEFAULT '',
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS resource_middlewares (
        resource_id   TEXT NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
        middleware_id TEXT NOT NULL REFERENCES middlewares(id) ON DELETE CASCADE,
        priority      INTEGER NOT NULL DEFAULT 100,
        PRIMARY KEY (resource_id, middleware_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS resource_services (
        resource_id TEXT PRIMARY KEY REFERENCES resources(id) ON DELETE CASCADE,
        service_id  TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_resources_status ON resources(status)",
];
