mod common;

use common::{FakeBackend, Mode, client, node, quiet_config};
use slurm_informer::slurm::backend::Backend;
use slurm_informer::slurm::chain::VersionedChain;
use slurm_informer::{Error, GetOptions, ListOptions, Node, ObjectKey, ObjectType, Reader, Writer};
use std::sync::Arc;

fn chain(backends: &[Arc<FakeBackend>]) -> VersionedChain {
    VersionedChain::new(
        backends
            .iter()
            .map(|b| b.clone() as Arc<dyn Backend>)
            .collect(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_falls_back_in_order_and_pins() {
    let v43 = FakeBackend::new("v0.0.43");
    let v42 = FakeBackend::new("v0.0.42");
    let v41 = FakeBackend::new("v0.0.41");
    v43.set_mode(Mode::Down);
    v42.set_mode(Mode::Down);
    v41.insert(node("n1", 8));
    let chain = chain(&[v43.clone(), v42.clone(), v41.clone()]);

    let found = chain
        .get(ObjectType::Node, &ObjectKey::from("n1"), &GetOptions::default())
        .await
        .unwrap();
    assert_eq!(found, node("n1", 8).into());
    assert_eq!((v43.gets(), v42.gets(), v41.gets()), (1, 1, 1));
    assert_eq!(chain.sticky_version(), "v0.0.41");

    // later calls of any kind start at the pinned version
    chain.list(ObjectType::Node, &ListOptions::default()).await.unwrap();
    assert_eq!((v43.lists(), v42.lists(), v41.lists()), (0, 0, 1));
}

#[tokio::test]
async fn test_not_found_on_newer_version_is_final() {
    let v2 = FakeBackend::new("v0.0.43");
    let v1 = FakeBackend::new("v0.0.42");
    v1.insert(node("n1", 8));
    let config = quiet_config().with_uncached(ObjectType::Node);
    let client = client(config, &[v2.clone(), v1.clone()]);

    let err = client
        .get_object::<Node>("n1")
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
    assert_eq!(v1.gets(), 0);
    assert_eq!(client.chain().sticky_index(), 0);
}

#[tokio::test]
async fn test_no_content_on_newer_version_is_final() {
    let v43 = FakeBackend::new("v0.0.43");
    let v42 = FakeBackend::new("v0.0.42");
    v43.set_mode(Mode::NoContent);
    v42.insert(node("n1", 8));
    let chain = chain(&[v43.clone(), v42.clone()]);

    let err = chain
        .get(ObjectType::Node, &ObjectKey::from("n1"), &GetOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoContent), "unexpected error: {err}");
    assert_eq!((v43.gets(), v42.gets()), (1, 0));
    assert_eq!(chain.sticky_version(), "v0.0.43");
}

#[tokio::test]
async fn test_exhaustion_collects_errors_and_resets() {
    let v43 = FakeBackend::new("v0.0.43");
    let v42 = FakeBackend::new("v0.0.42");
    v43.set_mode(Mode::Down);
    v42.insert(node("n1", 4));
    let chain = chain(&[v43.clone(), v42.clone()]);

    chain
        .get(ObjectType::Node, &ObjectKey::from("n1"), &GetOptions::default())
        .await
        .unwrap();
    assert_eq!(chain.sticky_index(), 1);

    // the pinned version goes away and the newer one comes back; no wrap-around
    v42.set_mode(Mode::Down);
    v43.set_mode(Mode::Healthy);
    v43.insert(node("n1", 4));
    let err = chain
        .get(ObjectType::Node, &ObjectKey::from("n1"), &GetOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::Exhausted(errors) => assert_eq!(errors.len(), 1),
        other => panic!("expected exhaustion, got {other}"),
    }
    assert_eq!(chain.sticky_index(), 0);

    chain
        .get(ObjectType::Node, &ObjectKey::from("n1"), &GetOptions::default())
        .await
        .unwrap();
    assert_eq!(chain.sticky_version(), "v0.0.43");
}

#[tokio::test]
async fn test_delete_all_of_removes_every_object() {
    let v43 = FakeBackend::new("v0.0.43");
    v43.insert(node("n1", 1));
    v43.insert(node("n2", 1));
    let chain = chain(&[v43.clone()]);

    chain.delete_all_of(ObjectType::Node).await.unwrap();
    let remaining = chain.list(ObjectType::Node, &ListOptions::default()).await.unwrap();
    assert!(remaining.is_empty());
}
