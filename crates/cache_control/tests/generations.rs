//! Activation and cleanup across builds

use cache_control::{
    CacheConfig, CacheController, CacheStorage, ControlCommand, MemoryCacheStorage,
    MemoryNetwork, Request, Response, ResponsePayload,
};
use std::sync::Arc;

fn seeded_storage() -> MemoryCacheStorage {
    let storage = MemoryCacheStorage::new();
    for name in [
        "app-v1",
        "app-v2",
        "app-v3",
        "app-static-v3",
        "app-dynamic-v3",
        "unrelated-cache",
    ] {
        storage.put(name, "/", Response::ok(name)).unwrap();
    }
    storage
}

fn controller<S: CacheStorage + 'static>(
    build: &str,
    storage: S,
) -> CacheController<MemoryNetwork, S> {
    let network = MemoryNetwork::new();
    network.route("/", Response::ok(format!("shell {}", build)));
    let config = CacheConfig::new("app", build).with_precache_urls(["/"]);
    CacheController::new(config, network, storage).unwrap()
}

#[tokio::test]
async fn test_activation_deletes_only_older_generations() {
    let controller = controller("v3", seeded_storage());

    let mut deleted = controller.activate();
    deleted.sort();
    assert_eq!(deleted, vec!["app-v1", "app-v2"]);

    let mut remaining = controller.storage().cache_names();
    remaining.sort();
    assert_eq!(
        remaining,
        vec!["app-dynamic-v3", "app-static-v3", "app-v3", "unrelated-cache"]
    );
    assert_eq!(
        controller
            .storage()
            .lookup("unrelated-cache", "/")
            .unwrap()
            .text(),
        "unrelated-cache"
    );
}

#[tokio::test]
async fn test_cleanup_command_reports_deleted_count() {
    let controller = controller("v3", seeded_storage());

    let response = controller
        .handle_command(ControlCommand::ClearOldCaches.into())
        .await;
    assert!(response.success);
    match response.payload {
        ResponsePayload::Deleted { deleted_count, .. } => assert_eq!(deleted_count, 2),
        other => panic!("unexpected payload {:?}", other),
    }

    // Nothing left to clean on a second pass
    let response = controller
        .handle_command(ControlCommand::ForceCacheCleanup.into())
        .await;
    assert_eq!(
        response.payload,
        ResponsePayload::Deleted {
            deleted_count: 0,
            deleted: vec![]
        }
    );
}

#[tokio::test]
async fn test_clear_cache_spares_foreign_caches() {
    let controller = controller("v3", seeded_storage());

    let response = controller
        .handle_command(ControlCommand::ClearCache.into())
        .await;
    match response.payload {
        ResponsePayload::Deleted { deleted_count, .. } => assert_eq!(deleted_count, 5),
        other => panic!("unexpected payload {:?}", other),
    }
    assert_eq!(controller.storage().cache_names(), vec!["unrelated-cache"]);
}

#[tokio::test]
async fn test_new_build_takes_over_from_old() {
    let storage = Arc::new(MemoryCacheStorage::new());

    let old = controller("v1", storage.clone());
    old.install().await.unwrap();
    old.activate();
    old.handle_fetch(&Request::get("/api/plants")).await;
    old.handle_fetch(&Request::get("/img/fig.png")).await;

    let new = controller("v2", storage.clone());
    new.install().await.unwrap();
    let mut deleted = new.activate();
    deleted.sort();

    assert_eq!(deleted, vec!["app-dynamic-v1", "app-static-v1", "app-v1"]);
    assert_eq!(storage.lookup("app-v2", "/").unwrap().text(), "shell v2");
    assert_eq!(
        storage.cache_names(),
        vec!["app-dynamic-v2", "app-static-v2", "app-v2"]
    );
}
