//! Connection, migration and status helpers. Kept deliberately small: this
//! is a library, not a service, so there is no config-file layer -- only
//! the environment-variable surface the store actually needs.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub const ENV_DB_URL: &str = "PERMSTORE_DATABASE_URL";
pub const ENV_MAX_CONNECTIONS: &str = "PERMSTORE_MAX_CONNECTIONS";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Connect to Postgres using `PERMSTORE_DATABASE_URL`.
///
/// The pool size defaults to `DEFAULT_MAX_CONNECTIONS` but can be overridden
/// with `PERMSTORE_MAX_CONNECTIONS`; an unparseable override is ignored
/// rather than treated as fatal, since a bad pool-size override shouldn't
/// be able to take the whole store down.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    let max_connections = max_connections_from_env();

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

fn max_connections_from_env() -> u32 {
    std::env::var(ENV_MAX_CONNECTIONS)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_CONNECTIONS)
}

/// Runs the embedded schema migrations (see `migrations/`).
pub async fn migrate(pool: &PgPool) -> Result<()> {
    let report = sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("permstore migrate failed");
    if report.is_ok() {
        info!("permstore schema migrations applied");
    }
    report
}

/// Connectivity + schema-presence check, for CLI/daemon smoke tests.
///
/// Unlike a single-table presence check, this reports each of the three
/// tables the schema defines individually, so a partially-applied
/// migration (or a hand-edited database) is distinguishable from a clean
/// one instead of collapsing to a single boolean.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let tables: Vec<(String,)> = sqlx::query_as(
        r#"
        select table_name from information_schema.tables
        where table_schema = 'public'
          and table_name in ('user_permissions', 'repo_permissions', 'user_pending_permissions')
        "#,
    )
    .fetch_all(pool)
    .await
    .context("status table-presence query failed")?;
    let present: std::collections::HashSet<String> = tables.into_iter().map(|(name,)| name).collect();

    Ok(DbStatus {
        ok: one == 1,
        has_user_permissions: present.contains("user_permissions"),
        has_repo_permissions: present.contains("repo_permissions"),
        has_pending_permissions: present.contains("user_pending_permissions"),
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_user_permissions: bool,
    pub has_repo_permissions: bool,
    pub has_pending_permissions: bool,
}

impl DbStatus {
    /// True once every table the schema defines is present.
    pub fn schema_complete(&self) -> bool {
        self.has_user_permissions && self.has_repo_permissions && self.has_pending_permissions
    }
}
