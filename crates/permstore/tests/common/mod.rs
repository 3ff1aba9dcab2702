use sqlx::PgPool;

/// Connects and migrates against `PERMSTORE_DATABASE_URL`, returning `None`
/// (callers should skip, not fail) when it isn't set -- same convention as
/// the DB-gated tests this crate's teacher used.
pub async fn pool() -> Option<PgPool> {
    let url = match std::env::var(permstore::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: {} not set", permstore::ENV_DB_URL);
            return None;
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("connect");

    permstore::migrate(&pool).await.expect("migrate");

    sqlx::query("TRUNCATE user_permissions, repo_permissions, user_pending_permissions")
        .execute(&pool)
        .await
        .expect("truncate");

    Some(pool)
}

pub fn ids(values: &[u32]) -> roaring::RoaringBitmap {
    values.iter().copied().collect()
}
