//! Publish/subscribe holder for the latest value
//!
//! Subscribers are callbacks keyed by [`SubscriberId`]. A new subscriber is
//! called with the current value right away, then once per publication.
//! Publications are serialized by a gate so every subscriber sees values in
//! commit order.

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::Stream;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Subscriber callback
pub type SubscriberFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle identifying one attached subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Publisher<T> {
    current: RwLock<T>,
    subscribers: DashMap<SubscriberId, SubscriberFn<T>>,
    // Held across commit + delivery; callbacks must not attach subscribers
    // or publish on the same publisher synchronously.
    gate: Mutex<()>,
}

impl<T: Clone + Send + Sync + 'static> Publisher<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(initial),
            subscribers: DashMap::new(),
            gate: Mutex::new(()),
        }
    }

    /// Latest published value
    pub fn current(&self) -> T {
        self.current.read().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Attach `callback`; it is invoked with the current value before this returns
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> SubscriberId {
        let _gate = self.gate.lock();
        let id = SubscriberId::new();
        let callback: SubscriberFn<T> = Arc::new(callback);

        let value = self.current();
        callback(&value);
        self.subscribers.insert(id, callback);
        id
    }

    /// Detach a subscriber; returns false if it was not attached
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Replace the value and notify every subscriber
    pub fn publish(&self, value: T) {
        self.update(|_| value);
    }

    /// Derive the next value from the current one, commit it and notify
    ///
    /// The read, the commit and the delivery form one step with respect to
    /// other `update`/`publish` calls.
    pub fn update(&self, next: impl FnOnce(&T) -> T) -> T {
        let _gate = self.gate.lock();

        let value = {
            let mut current = self.current.write();
            *current = next(&current);
            current.clone()
        };

        let callbacks: Vec<SubscriberFn<T>> = self
            .subscribers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for callback in callbacks {
            callback(&value);
        }

        value
    }
}

impl<T: Clone + Send + Sync + 'static> Publisher<T> {
    /// Attach a channel-backed subscriber, detached when the returned stream drops
    pub fn updates(self: &Arc<Self>) -> Updates<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |value: &T| {
            let _ = tx.send(value.clone());
        });

        Updates {
            rx,
            id,
            publisher: Arc::downgrade(self),
        }
    }
}

/// Stream of published values
pub struct Updates<T: Clone + Send + Sync + 'static> {
    rx: mpsc::UnboundedReceiver<T>,
    id: SubscriberId,
    publisher: Weak<Publisher<T>>,
}

impl<T: Clone + Send + Sync + 'static> Updates<T> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next value, or `None` once the publisher is gone
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T: Clone + Send + Sync + 'static> Stream for Updates<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for Updates<T> {
    fn drop(&mut self) {
        if let Some(publisher) = self.publisher.upgrade() {
            publisher.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_subscriber_gets_current_value() {
        let publisher = Publisher::new(5);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        publisher.subscribe(move |v: &i32| sink.lock().push(*v));

        publisher.publish(6);
        assert_eq!(*seen.lock(), vec![5, 6]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let publisher = Publisher::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = publisher.subscribe(move |_: &i32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        publisher.publish(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_update_reads_latest() {
        let publisher = Publisher::new(vec![1]);
        publisher.update(|v| {
            let mut next = vec![0];
            next.extend(v);
            next
        });
        assert_eq!(publisher.current(), vec![0, 1]);
    }

    #[test]
    fn test_callback_may_detach_itself() {
        let publisher = Arc::new(Publisher::new(0));
        let slot: Arc<Mutex<Option<SubscriberId>>> = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&publisher);
        let own_id = slot.clone();
        let id = publisher.subscribe(move |v: &i32| {
            if *v > 0 {
                if let (Some(p), Some(id)) = (weak.upgrade(), *own_id.lock()) {
                    p.unsubscribe(id);
                }
            }
        });
        *slot.lock() = Some(id);

        publisher.publish(1);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_updates_stream_detaches_on_drop() {
        let publisher = Arc::new(Publisher::new(String::from("a")));
        let mut updates = publisher.updates();
        assert_eq!(updates.recv().await.as_deref(), Some("a"));

        publisher.publish("b".to_string());
        assert_eq!(updates.recv().await.as_deref(), Some("b"));

        drop(updates);
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
