use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use xc_client::test_util::FakeStore;
use xc_client::{ClientConfig, ClientError, ConnectionPool, Deadline, StoreClient};

fn soon() -> Deadline {
    Deadline::after(Duration::from_secs(2))
}

async fn pool_for(store: &FakeStore, pool_size: usize, max_overflow: usize) -> ConnectionPool {
    let mut config = ClientConfig::new(store.addr()).with_pool_size(pool_size);
    config.max_overflow = Some(max_overflow);
    ConnectionPool::connect(config).await.expect("pool")
}

#[tokio::test]
async fn prepopulates_to_capacity() {
    let store = FakeStore::start().await.expect("store");
    let pool = pool_for(&store, 4, 4).await;

    assert_eq!(pool.capacity(), 4);
    assert_eq!(pool.idle_count(), 4);
    assert!(store.wait_for_accepted(4).await);
}

#[tokio::test]
async fn reuses_idle_connections() {
    let store = FakeStore::start().await.expect("store");
    let pool = pool_for(&store, 2, 2).await;

    for _ in 0..5 {
        let mut conn = pool.acquire(soon()).await.expect("acquire");
        conn.ping(soon()).await.expect("ping");
    }
    assert!(store.wait_for_accepted(2).await);
    assert_eq!(pool.idle_count(), 2);
}

#[tokio::test]
async fn overflow_acquire_does_not_block_and_drains_on_release() {
    let store = FakeStore::start().await.expect("store");
    let pool = pool_for(&store, 3, 3).await;

    let mut held = Vec::new();
    for _ in 0..3 {
        held.push(pool.acquire(soon()).await.expect("acquire"));
    }
    assert_eq!(pool.idle_count(), 0);

    let extra = timeout(Duration::from_secs(1), pool.acquire(soon()))
        .await
        .expect("overflow acquire must not wait")
        .expect("acquire");
    held.push(extra);
    assert!(store.wait_for_accepted(4).await);

    drop(held);
    assert_eq!(pool.idle_count(), 3);
    assert!(store.wait_for_live(3).await);
}

#[tokio::test]
async fn waits_at_overflow_ceiling_until_deadline() {
    let store = FakeStore::start().await.expect("store");
    let pool = pool_for(&store, 1, 0).await;

    let held = pool.acquire(soon()).await.expect("acquire");
    let err = pool
        .acquire(Deadline::after(Duration::from_millis(100)))
        .await
        .err()
        .expect("ceiling reached");
    assert!(err.is_timeout());

    drop(held);
    pool.acquire(soon()).await.expect("released connection is reusable");
    assert!(store.wait_for_accepted(1).await);
}

#[tokio::test]
async fn default_overflow_ceiling_is_twice_pool_size() {
    let store = FakeStore::start().await.expect("store");
    let config = ClientConfig::new(store.addr()).with_pool_size(2);
    let pool = ConnectionPool::connect(config).await.expect("pool");
    assert_eq!(pool.checkout_limit(), 4);

    let mut held = Vec::new();
    for _ in 0..4 {
        let conn = timeout(Duration::from_secs(1), pool.acquire(soon()))
            .await
            .expect("below the ceiling acquire must not wait")
            .expect("acquire");
        held.push(conn);
    }

    let err = pool
        .acquire(Deadline::after(Duration::from_millis(100)))
        .await
        .err()
        .expect("ceiling reached");
    assert!(err.is_timeout());

    drop(held);
    assert_eq!(pool.idle_count(), 2);
}

#[tokio::test]
async fn waiter_is_woken_by_release() {
    let store = FakeStore::start().await.expect("store");
    let pool = pool_for(&store, 1, 0).await;
    let held = pool.acquire(soon()).await.expect("acquire");

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(soon()).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(held);

    waiter.await.expect("join").expect("acquire after release");
}

#[tokio::test]
async fn poisoned_connection_is_closed_not_pooled() {
    let store = FakeStore::start().await.expect("store");
    let pool = pool_for(&store, 1, 1).await;
    store.push_reply(b":not-a-number\r\n");

    {
        let mut conn = pool.acquire(soon()).await.expect("acquire");
        conn.ping(soon()).await.unwrap_err();
        assert!(conn.is_poisoned());
    }
    assert_eq!(pool.idle_count(), 0);
    assert!(store.wait_for_live(0).await);
}

#[tokio::test]
async fn close_drains_idle_and_rejects_acquire() {
    let store = FakeStore::start().await.expect("store");
    let pool = pool_for(&store, 2, 2).await;
    let held = pool.acquire(soon()).await.expect("acquire");

    pool.close().await;
    assert_eq!(pool.idle_count(), 0);
    assert!(matches!(pool.acquire(soon()).await, Err(ClientError::PoolClosed)));
    assert!(store.wait_for_live(1).await);

    // A connection checked out across shutdown is closed on release.
    drop(held);
    assert_eq!(pool.idle_count(), 0);
    assert!(store.wait_for_live(0).await);
}

#[tokio::test]
async fn zero_pool_size_selects_default() {
    let store = FakeStore::start().await.expect("store");
    let client = StoreClient::with_config(ClientConfig::new(store.addr()).with_pool_size(0))
        .await
        .expect("client");

    // Zero selects the default size.
    assert_eq!(client.pool().capacity(), xc_client::DEFAULT_POOL_SIZE);
}

#[tokio::test]
async fn concurrent_callers_share_the_pool() {
    let store = FakeStore::start().await.expect("store");
    let config = ClientConfig::new(store.addr()).with_pool_size(4);
    let client = Arc::new(StoreClient::with_config(config).await.expect("client"));

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let client = Arc::clone(&client);
        tasks.push(tokio::spawn(async move {
            client.incr(soon(), b"counter").await
        }));
    }
    for task in tasks {
        task.await.expect("join").expect("incr");
    }

    assert_eq!(client.get(soon(), b"counter").await.expect("get"), Some(b"32".to_vec()));
    assert!(client.pool().idle_count() <= 4);
}
