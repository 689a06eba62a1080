//! Integration tests for the Redis store backend.
//!
//! These tests need Docker and are ignored by default:
//! `cargo test -p portcullis-store -- --ignored`

use std::sync::Arc;
use std::time::Duration;

use portcullis_store::{SharedStateStore, StoreConfig, connect};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");
            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            (container, format!("redis://127.0.0.1:{host_port}"))
        })
        .await;
    url.clone()
}

async fn redis_store() -> portcullis_store::DynStore {
    let config = StoreConfig {
        enabled: true,
        url: get_redis_url().await,
        command_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    connect(&config).await
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_connect_and_ping() {
    let store = redis_store().await;
    assert_eq!(store.backend(), "redis");
    store.ping().await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_set_get_delete() {
    let store = redis_store().await;
    store
        .set_ex("it:set-get", "value", Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(store.get("it:set-get").await.unwrap().as_deref(), Some("value"));
    assert!(store.exists("it:set-get").await.unwrap());

    store.delete("it:set-get").await.unwrap();
    assert!(store.get("it:set-get").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_window_is_fixed_by_first_increment() {
    let store = redis_store().await;
    let window = Duration::from_secs(30);

    assert_eq!(store.incr_with_expiry("it:window", window).await.unwrap(), 1);
    let first = store.ttl("it:window").await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.incr_with_expiry("it:window", window).await.unwrap(), 2);
    let second = store.ttl("it:window").await.unwrap().unwrap();

    assert!(second < first);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_concurrent_increments() {
    let store: Arc<dyn SharedStateStore> = redis_store().await;
    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .incr_with_expiry("it:concurrent", Duration::from_secs(30))
                .await
                .unwrap()
        }));
    }
    let mut counts = Vec::new();
    for handle in handles {
        counts.push(handle.await.unwrap());
    }
    counts.sort_unstable();
    assert_eq!(counts, (1..=20).collect::<Vec<i64>>());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_unreachable_reports_unavailable() {
    let config = StoreConfig {
        enabled: true,
        url: "redis://127.0.0.1:1".to_string(),
        timeout_ms: 100,
        command_timeout: Duration::from_millis(300),
        ..Default::default()
    };
    let store = connect(&config).await;
    assert_eq!(store.backend(), "redis");
    let err = store.incr("it:down").await.unwrap_err();
    assert!(err.is_unavailable());
}
