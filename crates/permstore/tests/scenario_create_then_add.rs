mod common;

use permstore::{ObjectType, Permission, Provider, Store};

#[tokio::test]
async fn create_then_add_repairs_inverse_index() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let store = Store::new(pool);
    let provider = Provider::External("p1".to_string());

    store
        .set_repo_permissions(42, Permission::Read, provider.clone(), common::ids(&[1, 2, 3]), None)
        .await
        .unwrap();

    let repo = store
        .load_repo_permissions(42, Permission::Read, &provider, None)
        .await
        .unwrap();
    assert_eq!(repo.user_ids, common::ids(&[1, 2, 3]));

    for user_id in [1, 2, 3] {
        let up = store
            .load_user_permissions(user_id, Permission::Read, ObjectType::Repos, &provider, None)
            .await
            .unwrap();
        assert!(up.ids.contains(42), "user {user_id} should see repo 42");
    }

    let first_updated_at = store
        .load_user_permissions(2, Permission::Read, ObjectType::Repos, &provider, None)
        .await
        .unwrap()
        .updated_at;

    store
        .set_repo_permissions(42, Permission::Read, provider.clone(), common::ids(&[2, 3, 4]), None)
        .await
        .unwrap();

    let repo = store
        .load_repo_permissions(42, Permission::Read, &provider, None)
        .await
        .unwrap();
    assert_eq!(repo.user_ids, common::ids(&[2, 3, 4]));

    let user1 = store
        .load_user_permissions(1, Permission::Read, ObjectType::Repos, &provider, None)
        .await
        .unwrap();
    assert!(!user1.ids.contains(42), "user 1 must have lost repo 42");

    let user4 = store
        .load_user_permissions(4, Permission::Read, ObjectType::Repos, &provider, None)
        .await
        .unwrap();
    assert!(user4.ids.contains(42), "user 4 must have gained repo 42");

    // Diff-minimality: user 2's row never needed to change, so its
    // updated_at must not have been bumped by the second call.
    let user2 = store
        .load_user_permissions(2, Permission::Read, ObjectType::Repos, &provider, None)
        .await
        .unwrap();
    assert_eq!(user2.updated_at, first_updated_at);
}
