//! Composes the retry and capture middlewares around a flaky gateway and
//! checks the stack behaves as the two layers were each unit-tested to
//! behave individually: retries happen before capture sees the final
//! result, and only the request that actually reached the provider is
//! recorded.

use async_trait::async_trait;
use chainforge::gateway::capture_middleware::CaptureGateway;
use chainforge::gateway::retry::{RetryGateway, RetryPolicy};
use chainforge::gateway::{CancellationToken, GatewayError, LlmGateway, MessageChunkStream, Prompt, Status, TokenUsage};
use chainforge::schema::Attr;
use chainforge::capture::InteractionCapture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct FlakyGateway {
    fail_times: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl LlmGateway for FlakyGateway {
    async fn generate_content_attr(
        &self,
        _token: &CancellationToken,
        _prompt: &Prompt,
        _debug: bool,
        _attrs: &[Attr],
    ) -> Result<String, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_times {
            Err(Box::new(std::io::Error::other("connection reset")))
        } else {
            Ok("final answer".to_string())
        }
    }

    async fn generate_content_attr_stream(
        &self,
        _token: &CancellationToken,
        _prompt: &Prompt,
        _debug: bool,
        _attrs: &[Attr],
    ) -> Result<MessageChunkStream, GatewayError> {
        unimplemented!("not exercised by this test")
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

    fn status(&self) -> Status {
        Status::Ready
    }
}

#[tokio::test]
async fn capture_wrapping_retry_records_one_interaction_with_the_eventual_success() {
    let flaky = Arc::new(FlakyGateway {
        fail_times: 2,
        calls: AtomicUsize::new(0),
    });
    let retried = RetryGateway::new(
        flaky.clone(),
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
        },
    );
    let capture = Arc::new(InteractionCapture::new(10));
    let gateway = CaptureGateway::new(Arc::new(retried), capture.clone(), "flaky-provider");

    let prompt = Prompt::new("greet", "say hi", "hello");
    let token = CancellationToken::new();
    let text = gateway
        .generate_content_attr(&token, &prompt, false, &[])
        .await
        .unwrap();

    assert_eq!(text, "final answer");
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3, "retry should have absorbed the two failures");

    let interactions = capture.interactions();
    assert_eq!(interactions.len(), 1, "capture sees one logical call, not one per retry attempt");
    assert_eq!(interactions[0].response_text.as_deref(), Some("final answer"));
    assert!(interactions[0].error.is_none());
}

#[tokio::test]
async fn capture_records_the_terminal_error_once_retries_are_exhausted() {
    let flaky = Arc::new(FlakyGateway {
        fail_times: 10,
        calls: AtomicUsize::new(0),
    });
    let retried = RetryGateway::new(
        flaky,
        RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
        },
    );
    let capture = Arc::new(InteractionCapture::new(10));
    let gateway = CaptureGateway::new(Arc::new(retried), capture.clone(), "flaky-provider");

    let prompt = Prompt::new("greet", "say hi", "hello");
    let token = CancellationToken::new();
    let err = gateway
        .generate_content_attr(&token, &prompt, false, &[])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("2 attempt"));
    let interactions = capture.interactions();
    assert_eq!(interactions.len(), 1);
    assert!(interactions[0].response_text.is_none());
    assert!(interactions[0].error.is_some());
}
