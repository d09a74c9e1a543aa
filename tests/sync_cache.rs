use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use todo_sync::{MemoryStore, RemoteStore, Snapshot, SyncCache, NewTodo};
use tokio::time::{timeout, Instant};

fn cache_with(store: MemoryStore) -> (Arc<MemoryStore>, Arc<SyncCache<Arc<MemoryStore>>>) {
    let store = Arc::new(store);
    let cache = Arc::new(SyncCache::new(store.clone()));
    (store, cache)
}

fn texts(snapshot: &Snapshot) -> Vec<String> {
    snapshot.iter().map(|t| t.text.clone()).collect()
}

#[tokio::test]
async fn create_complete_remove_scenario() {
    let (_store, cache) = cache_with(MemoryStore::new());
    assert!(cache.refresh().await);
    assert!(cache.snapshot().is_empty());

    let todo = cache.create("Buy milk").await.expect("created");
    assert_eq!(todo.id, Some(1));

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, Some(1));
    assert_eq!(snapshot[0].text, "Buy milk");
    assert!(!snapshot[0].completed);

    cache.set_completed(Some(1), true).await.expect("completed");
    assert!(cache.snapshot()[0].completed);

    assert!(cache.remove(Some(1)).await);
    assert!(cache.snapshot().is_empty());
}

#[tokio::test]
async fn create_prepends_and_grows_by_one() {
    let (_store, cache) = cache_with(MemoryStore::with_rows(["a", "b"]));
    cache.refresh().await;
    let before = cache.snapshot();

    let todo = cache.create("c").await.unwrap();
    let after = cache.snapshot();

    assert_eq!(after.len(), before.len() + 1);
    assert_eq!(after[0].text, "c");
    assert!(!after[0].completed);
    assert!(after[0].id.is_some());
    assert_eq!(after[0], todo);
    assert_eq!(&after[1..], &before[..]);
}

#[tokio::test]
async fn blank_text_is_rejected_without_store_call() {
    let (store, cache) = cache_with(MemoryStore::new());
    cache.refresh().await;
    let before = cache.snapshot();

    assert!(cache.create("").await.is_none());
    assert!(cache.create("   ").await.is_none());

    assert_eq!(store.calls().insert(), 0);
    assert!(Arc::ptr_eq(&before, &cache.snapshot()));
}

#[tokio::test]
async fn completion_round_trip_keeps_other_fields() {
    let (_store, cache) = cache_with(MemoryStore::new());
    let original = cache.create("Write report").await.unwrap();

    cache.set_completed(original.id, true).await.unwrap();
    cache.set_completed(original.id, false).await.unwrap();

    let item = cache.snapshot()[0].clone();
    assert_eq!(item.completed, original.completed);
    assert_eq!(item.text, original.text);
    assert_eq!(item.id, original.id);
    assert_eq!(item.created_at, original.created_at);
}

#[tokio::test]
async fn set_text_replaces_only_that_item() {
    let (_store, cache) = cache_with(MemoryStore::with_rows(["one", "two", "three"]));
    cache.refresh().await;
    let before = cache.snapshot();
    let target = before[1].id;

    cache.set_text(target, "deux").await.unwrap();

    let after = cache.snapshot();
    assert_eq!(texts(&after), ["three", "deux", "one"]);
    assert_eq!(after[1].created_at, before[1].created_at);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[2]);
}

#[tokio::test]
async fn blank_edit_is_rejected() {
    let (store, cache) = cache_with(MemoryStore::with_rows(["keep"]));
    cache.refresh().await;

    assert!(cache.set_text(Some(1), " \t ").await.is_none());
    assert_eq!(store.calls().update(), 0);
    assert_eq!(texts(&cache.snapshot()), ["keep"]);
}

#[tokio::test]
async fn absent_id_never_reaches_store() {
    let (store, cache) = cache_with(MemoryStore::with_rows(["x"]));
    cache.refresh().await;
    let calls_before = store.calls().total();
    let before = cache.snapshot();

    assert!(cache.set_completed(None, true).await.is_none());
    assert!(cache.set_text(None, "y").await.is_none());
    assert!(cache.toggle(None).await.is_none());
    assert!(!cache.remove(None).await);

    assert_eq!(store.calls().total(), calls_before);
    assert!(Arc::ptr_eq(&before, &cache.snapshot()));
}

#[tokio::test]
async fn remove_unknown_id_leaves_list_unchanged() {
    let (_store, cache) = cache_with(MemoryStore::with_rows(["a", "b"]));
    cache.refresh().await;

    cache.remove(Some(99)).await;
    assert_eq!(texts(&cache.snapshot()), ["b", "a"]);
}

#[tokio::test]
async fn failed_refresh_publishes_empty_list() {
    let (store, cache) = cache_with(MemoryStore::with_rows(["a", "b"]));
    assert!(cache.refresh().await);
    assert_eq!(cache.snapshot().len(), 2);

    store.set_failing(true);
    assert!(!cache.refresh().await);
    assert!(cache.snapshot().is_empty());
}

#[tokio::test]
async fn failed_fetch_keeps_previous_snapshot() {
    let (store, cache) = cache_with(MemoryStore::with_rows(["a"]));
    cache.fetch().await.unwrap();

    store.set_failing(true);
    assert!(cache.fetch().await.is_err());
    assert_eq!(texts(&cache.snapshot()), ["a"]);
}

#[tokio::test]
async fn failed_writes_leave_snapshot_untouched() {
    let (store, cache) = cache_with(MemoryStore::with_rows(["a"]));
    cache.refresh().await;
    let before = cache.snapshot();

    store.set_failing(true);
    assert!(cache.create("b").await.is_none());
    assert!(cache.set_completed(Some(1), true).await.is_none());
    assert!(cache.set_text(Some(1), "z").await.is_none());
    assert!(!cache.remove(Some(1)).await);

    assert!(Arc::ptr_eq(&before, &cache.snapshot()));
}

#[tokio::test]
async fn update_of_missing_row_fails() {
    let (_store, cache) = cache_with(MemoryStore::new());
    assert!(cache.set_completed(Some(5), true).await.is_none());
    assert!(cache.snapshot().is_empty());
}

#[tokio::test]
async fn toggle_flips_flag() {
    let (store, cache) = cache_with(MemoryStore::with_rows(["a"]));
    cache.refresh().await;

    assert!(cache.toggle(Some(1)).await.unwrap().completed);
    assert!(!cache.toggle(Some(1)).await.unwrap().completed);

    let updates = store.calls().update();
    assert!(cache.toggle(Some(42)).await.is_none());
    assert_eq!(store.calls().update(), updates);
}

#[tokio::test]
async fn concurrent_creates_keep_both_items() {
    let (store, cache) = cache_with(MemoryStore::new());
    let latency = Duration::from_millis(200);
    store.set_latency(latency);

    let started = Instant::now();
    let (a, b) = tokio::join!(cache.create("first"), cache.create("second"));
    // Both inserts were pending at the same time
    assert!(started.elapsed() < latency * 2);

    let a = a.unwrap();
    let b = b.unwrap();
    assert_ne!(a.id, b.id);

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.len(), 2);
    let mut got = texts(&snapshot);
    got.sort();
    assert_eq!(got, ["first", "second"]);
    // The later commit resolves last and lands at the head
    assert_eq!(snapshot[0].id, a.id.max(b.id));
}

#[tokio::test]
async fn subscribers_see_every_snapshot_in_order() {
    let (_store, cache) = cache_with(MemoryStore::new());
    let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let id = cache.subscribe(move |items| sink.lock().push(items.len()));

    cache.create("a").await;
    cache.create("b").await;
    cache.remove(Some(1)).await;
    assert!(cache.unsubscribe(id));
    cache.create("c").await;

    assert_eq!(*seen.lock(), vec![0, 1, 2, 1]);
}

#[tokio::test]
async fn remote_change_triggers_refresh() {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(SyncCache::new(store.clone()));
    let _feed = cache.listen().await.unwrap();
    let mut updates = cache.updates();
    assert!(updates.recv().await.unwrap().is_empty());

    // Another client writes straight to the store
    store.insert(NewTodo::new("from elsewhere")).await.unwrap();

    let snapshot = timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("refresh published")
        .unwrap();
    assert_eq!(texts(&snapshot), ["from elsewhere"]);
    assert!(store.calls().list() >= 1);
}

#[tokio::test]
async fn dropping_feed_stops_refreshes() {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(SyncCache::new(store.clone()));
    let feed = cache.listen().await.unwrap();
    assert_eq!(store.listener_count(), 1);

    drop(feed);
    assert_eq!(store.listener_count(), 0);

    store.insert(NewTodo::new("unseen")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.calls().list(), 0);
    assert!(cache.snapshot().is_empty());
}

#[tokio::test]
async fn two_caches_converge_through_change_feed() {
    let store = Arc::new(MemoryStore::new());
    let ours = Arc::new(SyncCache::new(store.clone()));
    let theirs = Arc::new(SyncCache::new(store.clone()));
    let _feed = theirs.listen().await.unwrap();
    let mut their_updates = theirs.updates();
    their_updates.recv().await;

    ours.create("shared").await.unwrap();

    let snapshot = timeout(Duration::from_secs(2), their_updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(texts(&snapshot), ["shared"]);
    assert_eq!(texts(&ours.snapshot()), ["shared"]);
}
