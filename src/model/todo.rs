use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable ordered list of tasks handed to subscribers
pub type Snapshot = Arc<[Todo]>;

/// One row of the `todos` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    /// Server-assigned primary key, absent until the row exists remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(rename = "task", alias = "text")]
    pub text: String,

    #[serde(rename = "is_completed", alias = "completed", default)]
    pub completed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Reserved for per-user partitioning; never read by the cache
    #[serde(rename = "user_id", alias = "owner", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl Todo {
    /// A task that has not been stored yet
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            completed: false,
            created_at: None,
            owner: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Whether `id` addresses this row
    pub fn has_id(&self, id: i64) -> bool {
        self.id == Some(id)
    }
}

/// Insert payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
    #[serde(rename = "task")]
    pub text: String,

    #[serde(rename = "is_completed")]
    pub completed: bool,
}

impl NewTodo {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
        }
    }
}

/// Partial update payload; only present fields are written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPatch {
    #[serde(rename = "task", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(rename = "is_completed", default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TodoPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Apply the present fields to `todo`
    pub fn apply_to(&self, todo: &mut Todo) {
        if let Some(text) = &self.text {
            todo.text = text.clone();
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
    }
}

/// True when `text` has no visible characters
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
