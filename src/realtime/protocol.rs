//! Phoenix channel framing used by the realtime endpoint. Every frame is a
//! JSON object carrying a topic, an event name, a payload and an optional ref.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::store::{ChangeEvent, ChangeKind};

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const POSTGRES_CHANGES: &str = "postgres_changes";

/// One websocket frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixMessage {
    /// Join `topic` and ask for every row change on `schema.table`
    pub fn join(topic: &Topic, reference: u64) -> Self {
        Self {
            topic: topic.name(),
            event: PHX_JOIN.to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [{
                        "event": "*",
                        "schema": topic.schema,
                        "table": topic.table,
                    }],
                }
            }),
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    /// Decode a `postgres_changes` payload into a change event
    pub fn change_event(&self) -> Option<ChangeEvent> {
        if self.event != POSTGRES_CHANGES {
            return None;
        }
        let data: ChangeData = serde_json::from_value(self.payload.get("data")?.clone()).ok()?;
        Some(ChangeEvent {
            kind: data.kind,
            schema: data.schema,
            table: data.table,
            record: data.record.filter(|r| !is_empty_object(r)),
            old_record: data.old_record.filter(|r| !is_empty_object(r)),
        })
    }

    /// Status of a `phx_reply`, e.g. `ok` or `error`
    pub fn reply_status(&self) -> Option<&str> {
        if self.event != PHX_REPLY {
            return None;
        }
        self.payload.get("status").and_then(Value::as_str)
    }

    /// Human-readable reason carried by an error reply
    pub fn reply_reason(&self) -> String {
        let response = self.payload.get("response");
        match response.and_then(|r| r.get("reason")).and_then(Value::as_str) {
            Some(reason) => reason.to_string(),
            None => response.map(Value::to_string).unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: ChangeKind,
    schema: String,
    table: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|o| o.is_empty())
}

/// Channel topic for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub schema: String,
    pub table: String,
}

impl Topic {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// `realtime:<schema>:<table>`
    pub fn name(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }
}
