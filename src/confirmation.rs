//! Confirmation protocol: correlated request/response over the event bus for
//! tools and chain steps that need human approval before a side effect.
//!
//! No teacher file implements request/response correlation directly — the
//! teacher has no human-approval gate — so the mechanism is new, grounded on
//! the design note in spec §9 ("mutex-guarded table of single-slot channels
//! keyed by execution identifier; never block publishers") and on the
//! teacher's manual `Display`+`Error` idiom for its error enum.

use crate::event::{topics, EventBus, Handler, Payload};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// A request for human approval of a pending side effect.
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub execution_id: ExecutionId,
    pub session_id: String,
    pub title: String,
    pub message: String,
    pub content: Option<String>,
    pub content_type: Option<String>,
    pub confirm_text: Option<String>,
    pub cancel_text: Option<String>,
}

/// The human's answer, correlated back by `execution_id`.
#[derive(Debug, Clone)]
pub struct ConfirmationResponse {
    pub execution_id: ExecutionId,
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
    TimedOut,
    Cancelled,
}

impl std::fmt::Display for ConfirmationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmationError::TimedOut => write!(f, "confirmation timed out"),
            ConfirmationError::Cancelled => write!(f, "confirmation cancelled"),
        }
    }
}

impl std::error::Error for ConfirmationError {}

/// Initiates and correlates confirmation request/response pairs over an
/// [`EventBus`]. One instance can be shared process-wide: it subscribes
/// itself to the response topic it's constructed with and demultiplexes
/// responses to whichever `request` call is waiting on that execution id.
pub struct ConfirmationProtocol {
    bus: Arc<EventBus>,
    request_topic: &'static str,
    response_topic: &'static str,
    pending: Arc<Mutex<HashMap<ExecutionId, oneshot::Sender<bool>>>>,
    timeout: Duration,
}

impl ConfirmationProtocol {
    /// Build a protocol bound to the tool-confirmation topic pair
    /// (`tool.confirmation.request`/`.response`).
    pub async fn for_tool_confirmation(bus: Arc<EventBus>, timeout: Duration) -> Arc<Self> {
        Self::bound_to(
            bus,
            topics::TOOL_CONFIRMATION_REQUEST,
            topics::TOOL_CONFIRMATION_RESPONSE,
            timeout,
        )
        .await
    }

    /// Build a protocol bound to the diff-confirmation topic pair
    /// (`tool.diff.confirmation.request`/`.response`), used by write-file.
    pub async fn for_diff_confirmation(bus: Arc<EventBus>, timeout: Duration) -> Arc<Self> {
        Self::bound_to(
            bus,
            topics::TOOL_DIFF_CONFIRMATION_REQUEST,
            topics::TOOL_DIFF_CONFIRMATION_RESPONSE,
            timeout,
        )
        .await
    }

    /// Build a protocol bound to the chain-level confirmation topic pair
    /// (`user.confirmation.request`/`.response`).
    pub async fn for_user_confirmation(bus: Arc<EventBus>, timeout: Duration) -> Arc<Self> {
        Self::bound_to(
            bus,
            topics::USER_CONFIRMATION_REQUEST,
            topics::USER_CONFIRMATION_RESPONSE,
            timeout,
        )
        .await
    }

    async fn bound_to(
        bus: Arc<EventBus>,
        request_topic: &'static str,
        response_topic: &'static str,
        timeout: Duration,
    ) -> Arc<Self> {
        let protocol = Arc::new(Self {
            bus: bus.clone(),
            request_topic,
            response_topic,
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        });
        bus.subscribe(
            response_topic,
            Arc::new(ResponseRouter {
                pending: protocol.pending.clone(),
            }),
        )
        .await;
        protocol
    }

    /// Allocate an execution id, register its single-slot channel, publish
    /// the request, and wait for the matching response, a cancellation
    /// signal, or the configured timeout — whichever comes first. The
    /// channel is always removed on exit.
    pub async fn request(
        &self,
        session_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        content: Option<String>,
        content_type: Option<String>,
        cancel: impl std::future::Future<Output = ()>,
    ) -> Result<bool, ConfirmationError> {
        let execution_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(execution_id, tx);

        let request = ConfirmationRequest {
            execution_id,
            session_id: session_id.into(),
            title: title.into(),
            message: message.into(),
            content,
            content_type,
            confirm_text: None,
            cancel_text: None,
        };
        self.bus
            .publish(self.request_topic, Arc::new(request))
            .await;

        let outcome = tokio::select! {
            received = rx => received.map_err(|_| ConfirmationError::Cancelled),
            _ = cancel => Err(ConfirmationError::Cancelled),
            _ = tokio::time::sleep(self.timeout) => Err(ConfirmationError::TimedOut),
        };

        self.pending.lock().await.remove(&execution_id);
        outcome
    }

    pub fn request_topic(&self) -> &'static str {
        self.request_topic
    }

    pub fn response_topic(&self) -> &'static str {
        self.response_topic
    }
}

/// Subscriber that demultiplexes [`ConfirmationResponse`] payloads to the
/// pending request matching their `execution_id`. Unknown or stale ids are
/// silently ignored, and the write into the channel never blocks: if the
/// slot is already gone (timed out, cancelled), the send is simply dropped.
struct ResponseRouter {
    pending: Arc<Mutex<HashMap<ExecutionId, oneshot::Sender<bool>>>>,
}

#[async_trait]
impl Handler for ResponseRouter {
    async fn handle(&self, _topic: &str, payload: Payload) {
        let Some(response) = payload.downcast_ref::<ConfirmationResponse>() else {
            return;
        };
        if let Some(tx) = self.pending.lock().await.remove(&response.execution_id) {
            let _ = tx.send(response.confirmed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;

    #[tokio::test]
    async fn confirmed_response_resolves_the_matching_request() {
        let bus = Arc::new(EventBus::new());
        let protocol =
            ConfirmationProtocol::for_tool_confirmation(bus.clone(), Duration::from_secs(5)).await;

        let recorded_id = Arc::new(Mutex::new(None));
        let recorded_id2 = recorded_id.clone();
        bus.subscribe(
            protocol.request_topic(),
            Arc::new(CaptureRequestId(recorded_id2)),
        )
        .await;

        let protocol2 = protocol.clone();
        let bus2 = bus.clone();
        let recorded_id3 = recorded_id.clone();
        let responder = tokio::spawn(async move {
            loop {
                if let Some(id) = *recorded_id3.lock().await {
                    bus2.publish(
                        protocol2.response_topic(),
                        Arc::new(ConfirmationResponse {
                            execution_id: id,
                            confirmed: true,
                        }),
                    )
                    .await;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let result = protocol
            .request("session-1", "Confirm", "do it?", None, None, pending())
            .await;
        responder.await.unwrap();
        assert_eq!(result, Ok(true));
    }

    #[tokio::test]
    async fn times_out_when_nobody_responds() {
        let bus = Arc::new(EventBus::new());
        let protocol =
            ConfirmationProtocol::for_tool_confirmation(bus, Duration::from_millis(20)).await;
        let result = protocol
            .request("session-1", "Confirm", "do it?", None, None, pending())
            .await;
        assert_eq!(result, Err(ConfirmationError::TimedOut));
    }

    #[tokio::test]
    async fn unknown_execution_id_is_ignored_not_an_error() {
        let bus = Arc::new(EventBus::new());
        let protocol =
            ConfirmationProtocol::for_tool_confirmation(bus.clone(), Duration::from_millis(50))
                .await;
        bus.publish(
            protocol.response_topic(),
            Arc::new(ConfirmationResponse {
                execution_id: Uuid::new_v4(),
                confirmed: true,
            }),
        )
        .await;
        let result = protocol
            .request("session-1", "Confirm", "do it?", None, None, pending())
            .await;
        assert_eq!(result, Err(ConfirmationError::TimedOut));
    }

    struct CaptureRequestId(Arc<Mutex<Option<ExecutionId>>>);

    #[async_trait]
    impl Handler for CaptureRequestId {
        async fn handle(&self, _topic: &str, payload: Payload) {
            if let Some(req) = payload.downcast_ref::<ConfirmationRequest>() {
                *self.0.lock().await = Some(req.execution_id);
            }
        }
    }
}
