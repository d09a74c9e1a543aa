//! Remote Store Contract
//!
//! The cache only talks to the remote table through [`RemoteStore`]. Two
//! implementations ship with the crate: [`RestStore`] for the hosted HTTP API
//! and [`MemoryStore`] for in-process use.

pub mod memory;
pub mod rest;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::StoreResult;
use crate::model::{NewTodo, Todo, TodoPatch};

pub use memory::MemoryStore;
pub use rest::RestStore;

/// Name of the table every store operates on
pub const TODOS: &str = "todos";

/// Callback invoked once per remote change event
pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// CRUD and change-notification contract of the remote table
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Name of the table this store is bound to
    fn resource(&self) -> &str {
        TODOS
    }

    /// Fetch every row in the given order
    async fn list(&self, order: Order) -> StoreResult<Vec<Todo>>;

    /// Insert one row and return it with its server-assigned fields
    async fn insert(&self, todo: NewTodo) -> StoreResult<Todo>;

    /// Partially update the row with `id` and return the stored row
    async fn update(&self, id: i64, patch: TodoPatch) -> StoreResult<Todo>;

    /// Delete the row with `id`
    async fn delete(&self, id: i64) -> StoreResult<()>;

    /// Register `on_change` for insert/update/delete events on `resource`
    async fn subscribe(&self, resource: &str, on_change: ChangeCallback)
        -> StoreResult<Subscription>;
}

#[async_trait]
impl<S: RemoteStore + ?Sized> RemoteStore for Arc<S> {
    fn resource(&self) -> &str {
        (**self).resource()
    }

    async fn list(&self, order: Order) -> StoreResult<Vec<Todo>> {
        (**self).list(order).await
    }

    async fn insert(&self, todo: NewTodo) -> StoreResult<Todo> {
        (**self).insert(todo).await
    }

    async fn update(&self, id: i64, patch: TodoPatch) -> StoreResult<Todo> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        (**self).delete(id).await
    }

    async fn subscribe(
        &self,
        resource: &str,
        on_change: ChangeCallback,
    ) -> StoreResult<Subscription> {
        (**self).subscribe(resource, on_change).await
    }
}

/// Sort direction for [`Order`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Column ordering for `list`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub direction: Direction,
}

impl Order {
    /// `created_at` descending, the order the cache keeps
    pub fn newest_first() -> Self {
        Self {
            column: "created_at",
            direction: Direction::Descending,
        }
    }

    /// PostgREST `order=` value, e.g. `created_at.desc`
    pub fn to_query(&self) -> String {
        let dir = match self.direction {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        };
        format!("{}.{}", self.column, dir)
    }
}

/// Kind of row change reported by the notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One change notification
///
/// The record payloads are informational; consumers treat the event as a
/// signal only.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    pub record: Option<serde_json::Value>,
    pub old_record: Option<serde_json::Value>,
}

/// Live registration returned by [`RemoteStore::subscribe`]
///
/// Delivery stops when the handle is dropped or `unsubscribe` is called.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription backed by a background task; cancelling aborts it
    pub fn from_task(handle: JoinHandle<()>) -> Self {
        let abort = handle.abort_handle();
        Self::new(move || abort.abort())
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
