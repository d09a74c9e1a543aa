//! In-process table
//!
//! Behaves like the hosted table: ids and timestamps are assigned on insert,
//! every committed change is announced to subscribers on a spawned task.
//! Failure injection and call counters make it usable as a test double.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{ChangeCallback, ChangeEvent, ChangeKind, Direction, Order, RemoteStore, Subscription};
use crate::error::{StoreError, StoreResult};
use crate::model::{NewTodo, Todo, TodoPatch};

#[derive(Default)]
struct Table {
    rows: Vec<Todo>,
    next_id: i64,
    last_created: Option<DateTime<Utc>>,
}

/// Per-operation call counts
#[derive(Debug, Default)]
pub struct CallCounts {
    list: AtomicUsize,
    insert: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
}

impl CallCounts {
    pub fn list(&self) -> usize {
        self.list.load(Ordering::SeqCst)
    }

    pub fn insert(&self) -> usize {
        self.insert.load(Ordering::SeqCst)
    }

    pub fn update(&self) -> usize {
        self.update.load(Ordering::SeqCst)
    }

    pub fn delete(&self) -> usize {
        self.delete.load(Ordering::SeqCst)
    }

    /// Sum over all operations
    pub fn total(&self) -> usize {
        self.list() + self.insert() + self.update() + self.delete()
    }
}

/// Table held in memory
pub struct MemoryStore {
    table: Mutex<Table>,
    listeners: std::sync::Arc<DashMap<Uuid, ChangeCallback>>,
    failing: AtomicBool,
    latency: Mutex<Duration>,
    calls: CallCounts,
    schema: String,
    resource: String,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                next_id: 1,
                ..Default::default()
            }),
            listeners: std::sync::Arc::new(DashMap::new()),
            failing: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
            calls: CallCounts::default(),
            schema: "public".to_string(),
            resource: super::TODOS.to_string(),
        }
    }

    /// Store preloaded with `texts`, inserted oldest first
    pub fn with_rows<I, T>(texts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let store = Self::new();
        {
            let mut table = store.table.lock();
            for text in texts {
                let row = Self::assign(&mut table, NewTodo::new(text));
                table.rows.push(row);
            }
        }
        store
    }

    /// Make every subsequent call fail until switched off
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every table call by `latency`, like a network round trip
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    /// Number of live change listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Rows in insertion order
    pub fn rows(&self) -> Vec<Todo> {
        self.table.lock().rows.clone()
    }

    async fn round_trip(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn guard(&self, op: &str) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Remote(format!("{op} rejected by store")));
        }
        Ok(())
    }

    fn assign(table: &mut Table, todo: NewTodo) -> Todo {
        let id = table.next_id;
        table.next_id += 1;

        // Strictly increasing so newest-first ordering is total
        let mut created = Utc::now();
        if let Some(last) = table.last_created {
            if created <= last {
                created = last + ChronoDuration::microseconds(1);
            }
        }
        table.last_created = Some(created);

        Todo {
            id: Some(id),
            text: todo.text,
            completed: todo.completed,
            created_at: Some(created),
            owner: None,
        }
    }

    fn notify(&self, kind: ChangeKind, record: Option<&Todo>, old_record: Option<&Todo>) {
        let event = ChangeEvent {
            kind,
            schema: self.schema.clone(),
            table: self.resource.clone(),
            record: record.and_then(|r| serde_json::to_value(r).ok()),
            old_record: old_record.and_then(|r| serde_json::to_value(r).ok()),
        };

        let callbacks: Vec<ChangeCallback> =
            self.listeners.iter().map(|entry| entry.value().clone()).collect();
        for callback in callbacks {
            let event = event.clone();
            tokio::spawn(async move { callback(event) });
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn resource(&self) -> &str {
        &self.resource
    }

    async fn list(&self, order: Order) -> StoreResult<Vec<Todo>> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await;
        self.guard("list")?;

        let mut rows = self.rows();
        match order.column {
            "created_at" => rows.sort_by_key(|r| r.created_at),
            "id" => rows.sort_by_key(|r| r.id),
            "task" | "text" => rows.sort_by(|a, b| a.text.cmp(&b.text)),
            other => return Err(StoreError::Remote(format!("unknown column {other}"))),
        }
        if order.direction == Direction::Descending {
            rows.reverse();
        }
        Ok(rows)
    }

    async fn insert(&self, todo: NewTodo) -> StoreResult<Todo> {
        self.calls.insert.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await;
        self.guard("insert")?;

        let row = {
            let mut table = self.table.lock();
            let row = Self::assign(&mut table, todo);
            table.rows.push(row.clone());
            row
        };
        self.notify(ChangeKind::Insert, Some(&row), None);
        Ok(row)
    }

    async fn update(&self, id: i64, patch: TodoPatch) -> StoreResult<Todo> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await;
        self.guard("update")?;

        let (old, row) = {
            let mut table = self.table.lock();
            let row = table
                .rows
                .iter_mut()
                .find(|r| r.has_id(id))
                .ok_or(StoreError::NotFound { id })?;
            let old = row.clone();
            patch.apply_to(row);
            (old, row.clone())
        };
        self.notify(ChangeKind::Update, Some(&row), Some(&old));
        Ok(row)
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await;
        self.guard("delete")?;

        let removed = {
            let mut table = self.table.lock();
            let pos = table.rows.iter().position(|r| r.has_id(id));
            pos.map(|p| table.rows.remove(p))
        };
        // Deleting a missing row is not an error for the hosted table either
        if let Some(old) = removed {
            self.notify(ChangeKind::Delete, None, Some(&old));
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        resource: &str,
        on_change: ChangeCallback,
    ) -> StoreResult<Subscription> {
        if resource != self.resource {
            return Err(StoreError::Realtime(format!("unknown resource {resource}")));
        }

        let key = Uuid::new_v4();
        self.listeners.insert(key, on_change);

        let listeners = self.listeners.clone();
        Ok(Subscription::new(move || {
            listeners.remove(&key);
        }))
    }
}
