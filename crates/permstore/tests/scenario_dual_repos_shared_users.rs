mod common;

use permstore::{ObjectType, Permission, Provider, Store};

#[tokio::test]
async fn shared_user_sees_union_of_repos() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let store = Store::new(pool);
    let provider = Provider::External("p1".to_string());

    store
        .set_repo_permissions(10, Permission::Read, provider.clone(), common::ids(&[1, 2]), None)
        .await
        .unwrap();
    store
        .set_repo_permissions(20, Permission::Read, provider.clone(), common::ids(&[2, 3]), None)
        .await
        .unwrap();

    let user2 = store
        .load_user_permissions(2, Permission::Read, ObjectType::Repos, &provider, None)
        .await
        .unwrap();
    assert_eq!(user2.ids, common::ids(&[10, 20]));

    let user1 = store
        .load_user_permissions(1, Permission::Read, ObjectType::Repos, &provider, None)
        .await
        .unwrap();
    assert_eq!(user1.ids, common::ids(&[10]));

    let user3 = store
        .load_user_permissions(3, Permission::Read, ObjectType::Repos, &provider, None)
        .await
        .unwrap();
    assert_eq!(user3.ids, common::ids(&[20]));
}
