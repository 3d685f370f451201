// ABOUTME: Integration tests for deployment parameters over both config store backends.
// ABOUTME: Covers seeding, snapshots, the staging sentinel, and history across a rollout.

mod support;

use edgeswap::events::Decision;
use edgeswap::store::{
    ConfigStore, DeploymentParams, FileConfigStore, MemoryConfigStore, Param, ParamStore,
    STAGING_NONE,
};
use edgeswap::types::{DistributionId, HeaderPredicate, ServiceName, Version};
use std::sync::Arc;
use support::Harness;

fn seed_params() -> DeploymentParams {
    DeploymentParams {
        frontend_version: Version::new("v1").unwrap(),
        production_distribution_id: DistributionId::new("EPROD000001"),
        staging_distribution_id: None,
        staging_cleanup_enabled: true,
        single_header_predicate: HeaderPredicate::new("x-preview", "blue").unwrap(),
    }
}

#[tokio::test]
async fn seeded_params_read_back_from_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state/params.json");
    let service = ServiceName::new("shop").unwrap();

    let params = ParamStore::new(Arc::new(FileConfigStore::new(&path)), service.clone());
    params.seed(&seed_params()).await.unwrap();

    let reopened = ParamStore::new(Arc::new(FileConfigStore::new(&path)), service);
    assert_eq!(reopened.snapshot().await.unwrap(), seed_params());
}

#[tokio::test]
async fn services_do_not_share_keys() {
    let store = Arc::new(MemoryConfigStore::new());
    let shop = ParamStore::new(store.clone(), ServiceName::new("shop").unwrap());
    let blog = ParamStore::new(store.clone(), ServiceName::new("blog").unwrap());

    shop.seed(&seed_params()).await.unwrap();
    assert!(blog.frontend_version().await.unwrap_err().is_not_found());
    assert_eq!(store.latest().len(), Param::ALL.len());
}

#[tokio::test]
async fn unseeded_service_is_not_found() {
    let params = ParamStore::new(
        Arc::new(MemoryConfigStore::new()),
        ServiceName::new("shop").unwrap(),
    );
    assert!(params.snapshot().await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn predicate_is_stored_as_one_opaque_string() {
    let store = Arc::new(MemoryConfigStore::new());
    let params = ParamStore::new(store.clone(), ServiceName::new("shop").unwrap());
    params.seed(&seed_params()).await.unwrap();

    let raw = store.get("/shop/distribution/single-header").await.unwrap();
    assert_eq!(
        HeaderPredicate::from_json(&raw).unwrap(),
        HeaderPredicate::new("x-preview", "blue").unwrap()
    );
}

#[tokio::test]
async fn rollout_writes_staging_then_clears_it() {
    let h = Harness::new().await;
    let run = h.start("v2");
    let prompt = h.prompt(1).await;

    let staging = h
        .params
        .staging_distribution_id()
        .await
        .unwrap()
        .expect("staging recorded before approval");
    h.orchestrator
        .on_approval_state_changed(&prompt.run_id, Decision::Accept)
        .unwrap();
    Harness::finish(run).await;

    let key = Param::StagingDistributionId.key(h.params.service());
    assert_eq!(
        h.store.history(&key),
        vec![
            STAGING_NONE.to_string(),
            staging.to_string(),
            STAGING_NONE.to_string()
        ]
    );
    let version_key = Param::FrontendVersion.key(h.params.service());
    assert_eq!(h.store.history(&version_key), vec!["v1", "v2"]);
}
