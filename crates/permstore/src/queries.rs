//! Parameterized statements and load/upsert primitives for the three
//! tables in the schema. Every function here is generic over
//! `sqlx::PgExecutor` so the exact same code path runs whether it's handed
//! a bare pool or a transaction (see `executor::with_transaction`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use roaring::RoaringBitmap;
use sqlx::PgExecutor;

use crate::bitset;
use crate::error::{Error, Result};
use crate::types::{is_zero_time, zero_time, ObjectType, PendingPermissions, Permission, Provider, RepoPermissions, UserPermissions};

pub async fn load_user_permissions<'e, E>(
    executor: E,
    user_id: i32,
    perm: Permission,
    object_type: ObjectType,
    provider: &Provider,
) -> Result<(RoaringBitmap, DateTime<Utc>)>
where
    E: PgExecutor<'e>,
{
    let row: Option<(Vec<u8>, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT object_ids, updated_at
        FROM user_permissions
        WHERE user_id = $1 AND permission = $2 AND object_type = $3 AND provider = $4
        "#,
    )
    .bind(user_id)
    .bind(perm.as_str())
    .bind(object_type.as_str())
    .bind(provider.as_str())
    .fetch_optional(executor)
    .await
    .map_err(Error::Database)?;

    match row {
        None => Ok((RoaringBitmap::new(), zero_time())),
        Some((bytes, updated_at)) if bytes.is_empty() => Ok((RoaringBitmap::new(), updated_at)),
        Some((bytes, updated_at)) => Ok((bitset::from_bytes(&bytes)?, updated_at)),
    }
}

pub async fn load_repo_permissions<'e, E>(
    executor: E,
    repo_id: i32,
    perm: Permission,
    provider: &Provider,
) -> Result<(RoaringBitmap, DateTime<Utc>)>
where
    E: PgExecutor<'e>,
{
    let row: Option<(Vec<u8>, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT user_ids, updated_at
        FROM repo_permissions
        WHERE repo_id = $1 AND permission = $2 AND provider = $3
        "#,
    )
    .bind(repo_id)
    .bind(perm.as_str())
    .bind(provider.as_str())
    .fetch_optional(executor)
    .await
    .map_err(Error::Database)?;

    match row {
        None => Ok((RoaringBitmap::new(), zero_time())),
        Some((bytes, updated_at)) if bytes.is_empty() => Ok((RoaringBitmap::new(), updated_at)),
        Some((bytes, updated_at)) => Ok((bitset::from_bytes(&bytes)?, updated_at)),
    }
}

pub async fn load_pending_permissions<'e, E>(
    executor: E,
    bind_id: &str,
    perm: Permission,
    object_type: ObjectType,
) -> Result<(RoaringBitmap, DateTime<Utc>)>
where
    E: PgExecutor<'e>,
{
    let row: Option<(Vec<u8>, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT object_ids, updated_at
        FROM user_pending_permissions
        WHERE bind_id = $1 AND permission = $2 AND object_type = $3
        "#,
    )
    .bind(bind_id)
    .bind(perm.as_str())
    .bind(object_type.as_str())
    .fetch_optional(executor)
    .await
    .map_err(Error::Database)?;

    match row {
        None => Ok((RoaringBitmap::new(), zero_time())),
        Some((bytes, updated_at)) if bytes.is_empty() => Ok((RoaringBitmap::new(), updated_at)),
        Some((bytes, updated_at)) => Ok((bitset::from_bytes(&bytes)?, updated_at)),
    }
}

/// Batch-loads `user_permissions` rows for a set of user ids. Missing keys
/// are simply absent from the returned map; callers treat that as empty.
/// Short-circuits to an empty map on empty input rather than issuing
/// `IN ()`.
pub async fn batch_load_user_permissions<'e, E>(
    executor: E,
    user_ids: &[i32],
    perm: Permission,
    object_type: ObjectType,
    provider: &Provider,
) -> Result<HashMap<i32, RoaringBitmap>>
where
    E: PgExecutor<'e>,
{
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(i32, Vec<u8>)> = sqlx::query_as(
        r#"
        SELECT user_id, object_ids
        FROM user_permissions
        WHERE user_id = ANY($1) AND permission = $2 AND object_type = $3 AND provider = $4
        "#,
    )
    .bind(user_ids)
    .bind(perm.as_str())
    .bind(object_type.as_str())
    .bind(provider.as_str())
    .fetch_all(executor)
    .await
    .map_err(Error::Database)?;

    let mut out = HashMap::with_capacity(rows.len());
    for (id, bytes) in rows {
        if bytes.is_empty() {
            continue;
        }
        out.insert(id, bitset::from_bytes(&bytes)?);
    }
    Ok(out)
}

/// Batch-loads `repo_permissions` rows for a set of repo ids. Same
/// empty-input short-circuit as `batch_load_user_permissions`.
pub async fn batch_load_repo_permissions<'e, E>(
    executor: E,
    repo_ids: &[i32],
    perm: Permission,
    provider: &Provider,
) -> Result<HashMap<i32, RoaringBitmap>>
where
    E: PgExecutor<'e>,
{
    if repo_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(i32, Vec<u8>)> = sqlx::query_as(
        r#"
        SELECT repo_id, user_ids
        FROM repo_permissions
        WHERE repo_id = ANY($1) AND permission = $2 AND provider = $3
        "#,
    )
    .bind(repo_ids)
    .bind(perm.as_str())
    .bind(provider.as_str())
    .fetch_all(executor)
    .await
    .map_err(Error::Database)?;

    let mut out = HashMap::with_capacity(rows.len());
    for (id, bytes) in rows {
        if bytes.is_empty() {
            continue;
        }
        out.insert(id, bitset::from_bytes(&bytes)?);
    }
    Ok(out)
}

pub async fn upsert_user_permissions<'e, E>(executor: E, p: &UserPermissions) -> Result<()>
where
    E: PgExecutor<'e>,
{
    if is_zero_time(&p.updated_at) {
        return Err(Error::MissingTimestamp);
    }
    let mut ids = p.ids.clone();
    bitset::optimize(&mut ids);
    let bytes = bitset::to_bytes(&ids)?;

    sqlx::query(
        r#"
        INSERT INTO user_permissions (user_id, permission, object_type, object_ids, provider, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT ON CONSTRAINT user_permissions_perm_object_provider_unique
        DO UPDATE SET object_ids = EXCLUDED.object_ids, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(p.user_id)
    .bind(p.perm.as_str())
    .bind(p.object_type.as_str())
    .bind(bytes)
    .bind(p.provider.as_str())
    .bind(p.updated_at)
    .execute(executor)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

pub async fn upsert_repo_permissions<'e, E>(executor: E, p: &RepoPermissions) -> Result<()>
where
    E: PgExecutor<'e>,
{
    if is_zero_time(&p.updated_at) {
        return Err(Error::MissingTimestamp);
    }
    let mut ids = p.user_ids.clone();
    bitset::optimize(&mut ids);
    let bytes = bitset::to_bytes(&ids)?;

    sqlx::query(
        r#"
        INSERT INTO repo_permissions (repo_id, permission, user_ids, provider, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT ON CONSTRAINT repo_permissions_perm_provider_unique
        DO UPDATE SET user_ids = EXCLUDED.user_ids, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(p.repo_id)
    .bind(p.perm.as_str())
    .bind(bytes)
    .bind(p.provider.as_str())
    .bind(p.updated_at)
    .execute(executor)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

pub async fn upsert_pending_permissions<'e, E>(executor: E, p: &PendingPermissions) -> Result<()>
where
    E: PgExecutor<'e>,
{
    if is_zero_time(&p.updated_at) {
        return Err(Error::MissingTimestamp);
    }
    let mut ids = p.ids.clone();
    bitset::optimize(&mut ids);
    let bytes = bitset::to_bytes(&ids)?;

    sqlx::query(
        r#"
        INSERT INTO user_pending_permissions (bind_id, permission, object_type, object_ids, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT ON CONSTRAINT user_pending_permissions_perm_object_unique
        DO UPDATE SET object_ids = EXCLUDED.object_ids, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&p.bind_id)
    .bind(p.perm.as_str())
    .bind(p.object_type.as_str())
    .bind(bytes)
    .bind(p.updated_at)
    .execute(executor)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
