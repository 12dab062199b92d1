//! Capture middleware: wraps another [`LlmGateway`] and records every
//! generate call into an [`InteractionCapture`].
//!
//! Composes the around-the-call event-emission pattern the teacher's
//! `agent.rs` uses (`LLMCallStarted`/`LLMCallCompleted`) with the
//! [`crate::capture`] record keeper. Concurrent callers serialize over the
//! capture's internal mutex; reads return defensive copies.

use super::{CancellationToken, GatewayError, LlmGateway, MessageChunkStream, Prompt, Status, TokenUsage};
use crate::capture::{InteractionCapture, InteractionError};
use crate::schema::Attr;
use async_trait::async_trait;
use std::sync::Arc;

pub struct CaptureGateway<G: LlmGateway> {
    inner: Arc<G>,
    capture: Arc<InteractionCapture>,
    provider_label: String,
}

impl<G: LlmGateway> CaptureGateway<G> {
    pub fn new(inner: Arc<G>, capture: Arc<InteractionCapture>, provider_label: impl Into<String>) -> Self {
        Self {
            inner,
            capture,
            provider_label: provider_label.into(),
        }
    }
}

#[async_trait]
impl<G: LlmGateway> LlmGateway for CaptureGateway<G> {
    async fn generate_content_attr(
        &self,
        token: &CancellationToken,
        prompt: &Prompt,
        debug: bool,
        attrs: &[Attr],
    ) -> Result<String, GatewayError> {
        let in_flight = self.capture.start(
            prompt.name.clone(),
            prompt.text.clone(),
            prompt.instruction.clone(),
            prompt.functions.iter().map(|f| f.name.clone()).collect(),
            Attr::list_to_map(attrs),
            self.provider_label.clone(),
            prompt.handlers.keys().cloned().collect(),
            debug,
        );
        let result = self
            .inner
            .generate_content_attr(token, prompt, debug, attrs)
            .await;
        match &result {
            Ok(text) => self.capture.complete(in_flight, Some(text.clone()), None),
            Err(e) => self.capture.complete(
                in_flight,
                None,
                Some(InteractionError {
                    message: e.to_string(),
                    type_name: "GatewayError".to_string(),
                }),
            ),
        }
        result
    }

    async fn generate_content_attr_stream(
        &self,
        token: &CancellationToken,
        prompt: &Prompt,
        debug: bool,
        attrs: &[Attr],
    ) -> Result<MessageChunkStream, GatewayError> {
        // Streaming responses pass through uncaptured: spec §4.2.2 only
        // requires capturing the two non-streaming generate calls.
        self.inner
            .generate_content_attr_stream(token, prompt, debug, attrs)
            .await
    }

    async fn count_tokens(
        &self,
        token: &CancellationToken,
        prompt: &Prompt,
        debug: bool,
        args: &[&str],
    ) -> Result<TokenUsage, GatewayError> {
        self.inner.count_tokens(token, prompt, debug, args).await
    }

    fn status(&self) -> Status {
        self.inner.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MessageChunk;
    use futures_util::stream;

    struct MockGateway;

    #[async_trait]
    impl LlmGateway for MockGateway {
        async fn generate_content_attr(
            &self,
            _token: &CancellationToken,
            _prompt: &Prompt,
            _debug: bool,
            _attrs: &[Attr],
        ) -> Result<String, GatewayError> {
            Ok("response".to_string())
        }

        async fn generate_content_attr_stream(
            &self,
            _token: &CancellationToken,
            _prompt: &Prompt,
            _debug: bool,
            _attrs: &[Attr],
        ) -> Result<MessageChunkStream, GatewayError> {
            Ok(Box::pin(stream::iter(vec![Ok(MessageChunk::default())])))
        }

        async fn count_tokens(
            &self,
            _token: &CancellationToken,
            _prompt: &Prompt,
            _debug: bool,
            _args: &[&str],
        ) -> Result<TokenUsage, GatewayError> {
            Ok(TokenUsage::default())
        }
    }

    #[tokio::test]
    async fn records_one_interaction_per_generate_call() {
        let capture = Arc::new(InteractionCapture::new(10));
        let gateway = CaptureGateway::new(Arc::new(MockGateway), capture.clone(), "mock");
        let prompt = Prompt::new("greet", "instr", "text");
        let token = CancellationToken::new();
        let text = gateway
            .generate_content_attr(&token, &prompt, false, &[])
            .await
            .unwrap();
        assert_eq!(text, "response");
        let interactions = capture.interactions();
        assert_eq!(interactions.len(), 1);
        assert_eq!(interactions[0].response_text.as_deref(), Some("response"));
        assert!(interactions[0].error.is_none());
    }
}
