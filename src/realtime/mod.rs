//! Realtime change feed
//!
//! Opens the service's websocket, joins the table topic and hands every
//! `postgres_changes` event to a callback. The connection is not re-opened
//! once it ends.

pub mod protocol;

use std::ops::ControlFlow;
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

use crate::error::{StoreError, StoreResult};
use crate::store::ChangeCallback;

pub use protocol::{PhoenixMessage, Topic};

/// Connect to `endpoint`, join `topic` and forward change events to
/// `on_change`. Returns the handle of the background task owning the socket;
/// aborting it closes the connection.
///
/// Fails unless the server accepts the join within one `heartbeat` period.
/// The task ends when the server closes or errors the channel.
pub async fn connect_channel(
    endpoint: Url,
    topic: Topic,
    heartbeat: Duration,
    on_change: ChangeCallback,
) -> StoreResult<JoinHandle<()>> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(endpoint.as_str())
        .await
        .map_err(|e| StoreError::Realtime(format!("connect failed: {e}")))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let mut next_ref: u64 = 1;
    let join = serde_json::to_string(&PhoenixMessage::join(&topic, next_ref))?;
    ws_tx
        .send(Message::Text(join.into()))
        .await
        .map_err(|e| StoreError::Realtime(format!("join failed: {e}")))?;

    let join_ref = next_ref.to_string();
    timeout(heartbeat, await_join_reply(&mut ws_rx, &topic, &join_ref))
        .await
        .map_err(|_| StoreError::Realtime(format!("no reply to join of {}", topic.name())))??;
    tracing::info!(topic = %topic.name(), "joined realtime channel");

    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    next_ref += 1;
                    let Ok(frame) = serde_json::to_string(&PhoenixMessage::heartbeat(next_ref)) else {
                        continue;
                    };
                    if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                        tracing::warn!(topic = %topic.name(), "heartbeat failed, closing channel");
                        break;
                    }
                }
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if dispatch(text.as_str(), &topic, &on_change).is_break() {
                            let _ = ws_tx.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(topic = %topic.name(), "realtime channel closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(topic = %topic.name(), error = %e, "realtime socket error");
                        break;
                    }
                },
            }
        }
    });

    Ok(handle)
}

/// Read frames until the reply to the join arrives
async fn await_join_reply<S>(ws_rx: &mut S, topic: &Topic, join_ref: &str) -> StoreResult<()>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let name = topic.name();
    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(StoreError::Realtime(format!("join failed: {e}"))),
        };
        let Ok(msg) = serde_json::from_str::<PhoenixMessage>(text.as_str()) else {
            continue;
        };
        if msg.topic != name || msg.reference.as_deref() != Some(join_ref) {
            tracing::debug!(topic = %msg.topic, event = %msg.event, "frame before join reply");
            continue;
        }
        return match msg.reply_status() {
            Some("ok") => Ok(()),
            _ => Err(StoreError::Realtime(format!(
                "join of {name} rejected: {}",
                msg.reply_reason()
            ))),
        };
    }
    Err(StoreError::Realtime(format!("socket closed before join of {name}")))
}

fn dispatch(text: &str, topic: &Topic, on_change: &ChangeCallback) -> ControlFlow<()> {
    let msg = match serde_json::from_str::<PhoenixMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparseable realtime frame");
            return ControlFlow::Continue(());
        }
    };

    if let Some(event) = msg.change_event() {
        if msg.topic == topic.name() {
            tracing::debug!(kind = ?event.kind, table = %event.table, "change received");
            on_change(event);
        }
        return ControlFlow::Continue(());
    }

    if msg.topic != topic.name() {
        tracing::debug!(topic = %msg.topic, event = %msg.event, "ignored realtime frame");
        return ControlFlow::Continue(());
    }

    match msg.event.as_str() {
        protocol::PHX_REPLY if msg.reply_status() == Some("error") => {
            tracing::warn!(topic = %msg.topic, reason = %msg.reply_reason(), "channel request rejected");
            ControlFlow::Break(())
        }
        protocol::PHX_ERROR | protocol::PHX_CLOSE => {
            tracing::warn!(topic = %msg.topic, event = %msg.event, "channel ended by server");
            ControlFlow::Break(())
        }
        _ => {
            tracing::debug!(topic = %msg.topic, event = %msg.event, "ignored realtime frame");
            ControlFlow::Continue(())
        }
    }
}
