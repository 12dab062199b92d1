//! In-process publish/subscribe event bus, keyed by topic string.
//!
//! The shape is lifted from the teacher's event-handler convention — an
//! async, `Send + Sync` handler trait invoked by an `Arc`-shared bus — but
//! generalized from a single closed enum of events to open topic strings, so
//! new topics (`tool.call.message`, `user.confirmation.request`, ...) don't
//! require touching the bus itself.

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Opaque event payload. Subscribers down-cast via [`Any`] to the concrete
/// type they expect for a given topic.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// A subscriber to one or more topics on the [`EventBus`].
///
/// Implementations must be non-blocking or short-lived: delivery happens on
/// the publisher's task, and a slow handler stalls every other subscriber on
/// the same topic.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, topic: &str, payload: Payload);
}

/// Canonical topic strings (spec §6).
pub mod topics {
    pub const TOOL_CALL_MESSAGE: &str = "tool.call.message";
    pub const TOOL_CONFIRMATION_REQUEST: &str = "tool.confirmation.request";
    pub const TOOL_CONFIRMATION_RESPONSE: &str = "tool.confirmation.response";
    pub const TOOL_DIFF_CONFIRMATION_REQUEST: &str = "tool.diff.confirmation.request";
    pub const TOOL_DIFF_CONFIRMATION_RESPONSE: &str = "tool.diff.confirmation.response";
    pub const USER_CONFIRMATION_REQUEST: &str = "user.confirmation.request";
    pub const USER_CONFIRMATION_RESPONSE: &str = "user.confirmation.response";
    pub const SKILL_INVOKED: &str = "skill.invoked";
    pub const SKILL_CLEARED: &str = "skill.cleared";
    pub const CHAT_RESPONSE: &str = "chat.response";
}

/// Topic-keyed publish/subscribe bus.
///
/// Delivery is synchronous on the publisher's task: `publish` awaits every
/// subscriber of the topic, in subscription order, before returning. A
/// handler that panics is caught and logged rather than propagated, so one
/// broken subscriber cannot poison the publisher or its siblings.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Arc<dyn Handler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register `handler` to receive every payload published on `topic`.
    pub async fn subscribe(&self, topic: impl Into<String>, handler: Arc<dyn Handler>) {
        let mut subs = self.subscribers.write().await;
        subs.entry(topic.into()).or_default().push(handler);
    }

    /// Publish `payload` on `topic`. Handler failures are isolated: a panic
    /// inside one handler is logged and does not stop delivery to the rest.
    pub async fn publish(&self, topic: &str, payload: Payload) {
        let handlers = {
            let subs = self.subscribers.read().await;
            subs.get(topic).cloned().unwrap_or_default()
        };
        for handler in handlers {
            let topic_owned = topic.to_string();
            let payload = payload.clone();
            let result = std::panic::AssertUnwindSafe(async {
                handler.handle(&topic_owned, payload).await;
            })
            .catch_unwind()
            .await;
            if result.is_err() {
                log::error!("event handler panicked while handling topic {}", topic);
            }
        }
    }

    /// Number of subscribers currently registered for `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .read()
            .await
            .get(topic)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

/// Small local adapter: `futures_util::FutureExt::catch_unwind` requires
/// `UnwindSafe`, which async blocks capturing `Arc<dyn Handler>` don't get
/// for free; `AssertUnwindSafe` above opts back in, matching the "failure of
/// a handler must not propagate to the publisher" invariant.
use futures_util::FutureExt;
