mod common;

use chrono::Utc;
use permstore::{ObjectType, Permission, Provider};

#[tokio::test]
async fn corrupt_bitset_payload_surfaces_as_corrupt_bitset_error() {
    let Some(pool) = common::pool().await else {
        return;
    };

    sqlx::query(
        r#"
        INSERT INTO user_permissions (user_id, permission, object_type, object_ids, provider, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(1234)
    .bind(Permission::Read.as_str())
    .bind(ObjectType::Repos.as_str())
    .bind(vec![0xFFu8, 0x00])
    .bind(Provider::Sourcegraph.as_str())
    .bind(Utc::now())
    .execute(&pool)
    .await
    .unwrap();

    let store = permstore::Store::new(pool);
    let err = store
        .load_user_permissions(1234, Permission::Read, ObjectType::Repos, &Provider::Sourcegraph, None)
        .await
        .unwrap_err();
    assert!(matches!(err, permstore::Error::CorruptBitset(_)));
}
