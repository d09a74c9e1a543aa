//! # todo-sync - Reactive task list over a hosted table
//!
//! Keeps an in-memory, observable copy of a remote `todos` table in step with
//! the service that owns it.
//!
//! ## Features
//!
//! - **Sync Cache**: create, complete, edit and delete tasks; each successful
//!   call republishes the whole list as an immutable snapshot
//! - **Live updates**: the realtime change feed triggers a full re-fetch
//! - **Fail-safe reads**: a failed fetch publishes an empty list, never stale rows
//! - **Pluggable stores**: PostgREST over HTTP, or an in-process table
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use todo_sync::{ClientConfig, RestStore, SyncCache};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = RestStore::new(ClientConfig::from_env()?)?;
//!     let cache = Arc::new(SyncCache::new(store));
//!
//!     let _feed = cache.listen().await?;
//!     cache.subscribe(|todos| {
//!         for todo in todos.iter() {
//!             println!("[{}] {}", if todo.completed { "x" } else { " " }, todo.text);
//!         }
//!     });
//!
//!     cache.refresh().await;
//!     cache.create("Buy milk").await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod realtime;
pub mod store;

// Re-export main types for library consumers
pub use cache::{SubscriberId, SyncCache, Updates};
pub use config::ClientConfig;
pub use error::{ErrorCategory, StoreError, StoreResult};
pub use model::{NewTodo, Snapshot, Todo, TodoPatch};
pub use store::{
    ChangeCallback, ChangeEvent, ChangeKind, MemoryStore, Order, RemoteStore, RestStore,
    Subscription,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
