//! Reactive Sync Cache
//!
//! In-memory mirror of the remote `todos` table. Every write goes to the
//! store first; only a successful response patches the local list, which is
//! then republished as a new immutable [`Snapshot`]. Change notifications from
//! the store trigger a full re-fetch.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use todo_sync::{MemoryStore, SyncCache};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = Arc::new(SyncCache::new(MemoryStore::new()));
//!     let _changes = cache.listen().await?;
//!     cache.subscribe(|items| println!("{} tasks", items.len()));
//!
//!     cache.refresh().await;
//!     if let Some(todo) = cache.create("Buy milk").await {
//!         cache.set_completed(todo.id, true).await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod publisher;

use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::model::todo::is_blank;
use crate::model::{NewTodo, Snapshot, Todo, TodoPatch};
use crate::store::{ChangeEvent, Order, RemoteStore, Subscription};

pub use publisher::{Publisher, SubscriberId, Updates};

/// Local list of tasks kept consistent with a [`RemoteStore`]
pub struct SyncCache<S> {
    store: S,
    snapshots: Arc<Publisher<Snapshot>>,
}

impl<S: RemoteStore> SyncCache<S> {
    /// Cache starting from an empty snapshot
    pub fn new(store: S) -> Self {
        Self {
            store,
            snapshots: Arc::new(Publisher::new(Snapshot::from(Vec::new()))),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current list, newest first
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.current()
    }

    /// Attach a consumer; it immediately receives the current snapshot
    pub fn subscribe(
        &self,
        callback: impl Fn(&Snapshot) + Send + Sync + 'static,
    ) -> SubscriberId {
        self.snapshots.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.snapshots.unsubscribe(id)
    }

    /// Snapshots as an async stream, starting with the current one
    pub fn updates(&self) -> Updates<Snapshot> {
        self.snapshots.updates()
    }

    /// Replace the list with a fresh fetch
    ///
    /// A failed fetch publishes an empty list rather than keeping rows that
    /// may no longer be current. Returns whether the fetch succeeded.
    pub async fn refresh(&self) -> bool {
        match self.store.list(Order::newest_first()).await {
            Ok(rows) => {
                tracing::debug!(count = rows.len(), "fetched todos");
                self.snapshots.publish(Snapshot::from(rows));
                true
            }
            Err(e) => {
                log_failure("fetching todos", &e);
                self.snapshots.publish(Snapshot::from(Vec::new()));
                false
            }
        }
    }

    /// Fetch and publish, handing the error back instead of clearing the list
    pub async fn fetch(&self) -> StoreResult<Snapshot> {
        let rows = self.store.list(Order::newest_first()).await?;
        let snapshot = Snapshot::from(rows);
        self.snapshots.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// Insert a task and place it at the head of the list
    pub async fn create(&self, text: &str) -> Option<Todo> {
        if is_blank(text) {
            tracing::warn!("task cannot be empty");
            return None;
        }

        match self.store.insert(NewTodo::new(text)).await {
            Ok(todo) => {
                tracing::info!(id = ?todo.id, "todo added");
                let head = todo.clone();
                self.snapshots.update(move |items| {
                    std::iter::once(head)
                        .chain(items.iter().cloned())
                        .collect()
                });
                Some(todo)
            }
            Err(e) => {
                log_failure("adding todo", &e);
                None
            }
        }
    }

    /// Mark a task done or not done
    pub async fn set_completed(&self, id: Option<i64>, completed: bool) -> Option<Todo> {
        let id = id?;

        match self.store.update(id, TodoPatch::completed(completed)).await {
            Ok(todo) => {
                tracing::info!(id, completed = todo.completed, "todo status updated");
                let completed = todo.completed;
                self.replace(id, |item| item.completed = completed);
                Some(todo)
            }
            Err(e) => {
                log_failure("updating todo", &e);
                None
            }
        }
    }

    /// Change the description of a task
    pub async fn set_text(&self, id: Option<i64>, text: &str) -> Option<Todo> {
        let id = id?;
        if is_blank(text) {
            tracing::warn!(id, "task cannot be empty for update");
            return None;
        }

        match self.store.update(id, TodoPatch::text(text)).await {
            Ok(todo) => {
                tracing::info!(id, "todo text updated");
                let text = todo.text.clone();
                self.replace(id, move |item| item.text = text.clone());
                Some(todo)
            }
            Err(e) => {
                log_failure("updating todo text", &e);
                None
            }
        }
    }

    /// Flip the completion flag of a cached task
    pub async fn toggle(&self, id: Option<i64>) -> Option<Todo> {
        let id = id?;
        let current = self.snapshot().iter().find(|t| t.has_id(id))?.completed;
        self.set_completed(Some(id), !current).await
    }

    /// Delete a task and drop it from the list
    pub async fn remove(&self, id: Option<i64>) -> bool {
        let Some(id) = id else {
            return false;
        };

        match self.store.delete(id).await {
            Ok(()) => {
                tracing::info!(id, "todo deleted");
                self.snapshots
                    .update(|items| items.iter().filter(|t| !t.has_id(id)).cloned().collect());
                true
            }
            Err(e) => {
                log_failure("deleting todo", &e);
                false
            }
        }
    }

    /// Handle a change notification: the payload is ignored, the list re-fetched
    pub async fn on_remote_change(&self) {
        self.refresh().await;
    }

    /// Publish a copy of the list with the row `id` patched by `patch`
    fn replace(&self, id: i64, patch: impl Fn(&mut Todo)) {
        self.snapshots.update(|items| {
            items
                .iter()
                .map(|item| {
                    let mut item = item.clone();
                    if item.has_id(id) {
                        patch(&mut item);
                    }
                    item
                })
                .collect()
        });
    }
}

impl<S: RemoteStore> SyncCache<S> {
    /// Subscribe to the store's change feed; each event spawns a refresh
    ///
    /// Delivery stops when the returned [`Subscription`] is dropped.
    pub async fn listen(self: &Arc<Self>) -> StoreResult<Subscription> {
        let cache = Arc::downgrade(self);
        let on_change = Arc::new(move |event: ChangeEvent| {
            tracing::debug!(kind = ?event.kind, table = %event.table, "remote change");
            if let Some(cache) = cache.upgrade() {
                tokio::spawn(async move { cache.on_remote_change().await });
            }
        });

        self.store.subscribe(self.store.resource(), on_change).await
    }
}

fn log_failure(action: &str, error: &StoreError) {
    tracing::error!(
        category = %error.category(),
        error = %error,
        "error {action}"
    );
}
