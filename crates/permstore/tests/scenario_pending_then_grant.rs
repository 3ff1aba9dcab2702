mod common;

use permstore::{ObjectType, Permission, Provider, Store};

#[tokio::test]
async fn pending_grant_promotes_to_bidirectional_concrete_grant() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let store = Store::new(pool);

    store
        .set_pending_permissions(
            vec![("alice@x".to_string(), Permission::Read, ObjectType::Repos, common::ids(&[7, 8, 9]))],
            None,
        )
        .await
        .unwrap();

    let pending = store
        .load_pending_permissions("alice@x", Permission::Read, ObjectType::Repos, None)
        .await
        .unwrap();
    assert_eq!(pending.ids, common::ids(&[7, 8, 9]));

    store
        .grant_pending_permissions(55, "alice@x", Permission::Read, ObjectType::Repos, None)
        .await
        .unwrap();

    let sourcegraph = Provider::Sourcegraph;
    let user = store
        .load_user_permissions(55, Permission::Read, ObjectType::Repos, &sourcegraph, None)
        .await
        .unwrap();
    assert_eq!(user.ids, common::ids(&[7, 8, 9]));

    for repo_id in [7, 8, 9] {
        let repo = store
            .load_repo_permissions(repo_id, Permission::Read, &sourcegraph, None)
            .await
            .unwrap();
        assert!(repo.user_ids.contains(55), "repo {repo_id} should grant user 55");
    }
}

#[tokio::test]
async fn missing_pending_grant_is_a_no_op() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let store = Store::new(pool);

    store
        .grant_pending_permissions(99, "nobody", Permission::Read, ObjectType::Repos, None)
        .await
        .unwrap();

    let sourcegraph = Provider::Sourcegraph;
    let err = store
        .load_user_permissions(99, Permission::Read, ObjectType::Repos, &sourcegraph, None)
        .await
        .unwrap_err();
    assert!(matches!(err, permstore::Error::NotFound));
}
