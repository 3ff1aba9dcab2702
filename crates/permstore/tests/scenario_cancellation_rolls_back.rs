mod common;

use permstore::{Permission, Provider, Store};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn cancelling_before_completion_writes_nothing() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let store = Store::new(pool);
    let provider = Provider::External("p1".to_string());

    let token = CancellationToken::new();
    token.cancel();

    let err = store
        .set_repo_permissions(55, Permission::Read, provider.clone(), common::ids(&[1, 2]), Some(&token))
        .await
        .unwrap_err();
    assert!(matches!(err, permstore::Error::Cancelled));

    let err = store
        .load_repo_permissions(55, Permission::Read, &provider, None)
        .await
        .unwrap_err();
    assert!(matches!(err, permstore::Error::NotFound));
}
