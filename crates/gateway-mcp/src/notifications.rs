//! Server-to-client notifications.
//!
//! Each live session subscribes once and receives a bounded queue.
//! Delivery never blocks: a full queue is reported to the sender and the
//! notification is dropped for that session.

use crate::error::McpError;
use crate::protocol::JsonRpcNotification;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Default per-session queue capacity.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 100;

/// Identifies the receiving session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NotificationContext {
    pub client_id: String,
    pub session_id: String,
}

/// A notification addressed to one session.
#[derive(Debug, Clone)]
pub struct ServerNotification {
    pub context: NotificationContext,
    pub notification: JsonRpcNotification,
}

struct Subscriber {
    id: u64,
    context: NotificationContext,
    sender: mpsc::Sender<ServerNotification>,
}

#[derive(Default)]
struct HubInner {
    subscribers: Mutex<HashMap<String, Subscriber>>,
    next_id: AtomicU64,
}

impl HubInner {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<String, Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Session-keyed notification fan-out.
pub struct NotificationHub {
    capacity: usize,
    inner: Arc<HubInner>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Arc::new(HubInner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a session. A second subscription for the same session id
    /// replaces the first.
    pub fn subscribe(&self, context: NotificationContext) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let replaced = self.inner.subscribers().insert(
            context.session_id.clone(),
            Subscriber {
                id,
                context: context.clone(),
                sender,
            },
        );
        if replaced.is_some() {
            tracing::debug!(session = %context.session_id, "Replaced notification subscriber");
        }
        Subscription {
            id,
            context,
            receiver,
            hub: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }

    /// Queue a notification for one session.
    pub fn send_to(
        &self,
        session_id: &str,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), McpError> {
        let subscribers = self.inner.subscribers();
        let subscriber = subscribers
            .get(session_id)
            .ok_or_else(|| McpError::NotSubscribed(session_id.to_string()))?;
        deliver(subscriber, JsonRpcNotification::new(method, params))
    }

    /// Queue a notification for every session. Sessions whose queue is full
    /// or closed are reported in the error; the others still receive it.
    pub fn broadcast(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let subscribers = self.inner.subscribers();
        let mut failed: Vec<String> = subscribers
            .values()
            .filter(|s| deliver(s, notification.clone()).is_err())
            .map(|s| s.context.session_id.clone())
            .collect();
        if failed.is_empty() {
            Ok(())
        } else {
            failed.sort();
            Err(McpError::NotificationsDropped { sessions: failed })
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

fn deliver(subscriber: &Subscriber, notification: JsonRpcNotification) -> Result<(), McpError> {
    let message = ServerNotification {
        context: subscriber.context.clone(),
        notification,
    };
    match subscriber.sender.try_send(message) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            Err(McpError::QueueFull(subscriber.context.session_id.clone()))
        }
        Err(TrySendError::Closed(_)) => Err(McpError::SubscriptionClosed(
            subscriber.context.session_id.clone(),
        )),
    }
}

/// Receiving side of a session's queue. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    context: NotificationContext,
    receiver: mpsc::Receiver<ServerNotification>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn context(&self) -> &NotificationContext {
        &self.context
    }

    /// Wait for the next notification.
    pub async fn recv(&mut self) -> Option<ServerNotification> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ServerNotification> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            let mut subscribers = hub.subscribers();
            if subscribers
                .get(&self.context.session_id)
                .is_some_and(|s| s.id == self.id)
            {
                subscribers.remove(&self.context.session_id);
            }
        }
    }
}
