//! Retry middleware: wraps another [`LlmGateway`] and retries the two
//! non-streaming generate calls on any error, with exponential backoff.
//!
//! The policy's field shape (`max_attempts`, `initial_delay`,
//! `backoff_multiplier`) is grounded on `darval-multi-llm`'s
//! `internals::retry::RetryPolicy` — the teacher itself has no retry logic
//! anywhere in its client stack. Deliberately narrower than that source: no
//! circuit breaker, no rate-limit-header parsing, just the exponential
//! backoff spec §4.2.1 actually asks for.

use super::{CancellationToken, GatewayError, LlmGateway, MessageChunkStream, Prompt, Status, TokenUsage};
use crate::schema::Attr;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `i` (0-indexed retry count, not counting the
    /// first try): `initial * 2^i`.
    pub fn delay_for_attempt(&self, i: u32) -> Duration {
        self.initial_delay * 2u32.saturating_pow(i)
    }
}

/// Wraps an inner gateway, retrying `generate_content_attr` and
/// `generate_content` on any error up to `policy.max_attempts` times.
/// Streaming, token counting, and status pass through unretried.
pub struct RetryGateway<G: LlmGateway> {
    inner: Arc<G>,
    policy: RetryPolicy,
}

impl<G: LlmGateway> RetryGateway<G> {
    pub fn new(inner: Arc<G>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

/// Error returned once every retry attempt has been exhausted: the terminal
/// error, wrapped with the attempt count.
#[derive(Debug)]
pub struct RetriesExhausted {
    pub attempts: u32,
    pub last_error: GatewayError,
}

impl std::fmt::Display for RetriesExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "gave up after {} attempt(s), last error: {}",
            self.attempts, self.last_error
        )
    }
}

impl std::error::Error for RetriesExhausted {}

#[async_trait]
impl<G: LlmGateway> LlmGateway for RetryGateway<G> {
    async fn generate_content_attr(
        &self,
        token: &CancellationToken,
        prompt: &Prompt,
        debug: bool,
        attrs: &[Attr],
    ) -> Result<String, GatewayError> {
        let mut last_error: Option<GatewayError> = None;
        for attempt in 0..self.policy.max_attempts {
            if token.is_cancelled() {
                return Err(Box::new(RetriesExhausted {
                    attempts: attempt,
                    last_error: last_error
                        .unwrap_or_else(|| Box::new(std::io::Error::from(std::io::ErrorKind::Interrupted))),
                }));
            }
            match self
                .inner
                .generate_content_attr(token, prompt, debug, attrs)
                .await
            {
                Ok(text) => return Ok(text),
                Err(e) => {
                    log::warn!(
                        "generate_content_attr attempt {}/{} failed: {}",
                        attempt + 1,
                        self.policy.max_attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempt + 1 < self.policy.max_attempts {
                        let delay = self.policy.delay_for_attempt(attempt);
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = token.cancelled() => {
                                return Err(Box::new(RetriesExhausted {
                                    attempts: attempt + 1,
                                    last_error: last_error.unwrap(),
                                }));
                            }
                        }
                    }
                }
            }
        }
        Err(Box::new(RetriesExhausted {
            attempts: self.policy.max_attempts,
            last_error: last_error.unwrap(),
        }))
    }

    async fn generate_content_attr_stream(
        &self,
        token: &CancellationToken,
        prompt: &Prompt,
        debug: bool,
        attrs: &[Attr],
    ) -> Result<MessageChunkStream, GatewayError> {
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
    use std::sync::atomic::{AtomicUsize, Ordering};

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
                Err(Box::new(std::io::Error::other("transient")))
            } else {
                Ok("ok".to_string())
            }
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
    async fn succeeds_after_transient_failures_within_budget() {
        let inner = Arc::new(FlakyGateway {
            fail_times: 2,
            calls: AtomicUsize::new(0),
        });
        let gateway = RetryGateway::new(
            inner,
            RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
            },
        );
        let prompt = Prompt::new("p", "i", "t");
        let token = CancellationToken::new();
        let result = gateway
            .generate_content_attr(&token, &prompt, false, &[])
            .await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn surfaces_wrapped_error_with_attempt_count_once_exhausted() {
        let inner = Arc::new(FlakyGateway {
            fail_times: 10,
            calls: AtomicUsize::new(0),
        });
        let gateway = RetryGateway::new(
            inner,
            RetryPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
            },
        );
        let prompt = Prompt::new("p", "i", "t");
        let token = CancellationToken::new();
        let err = gateway
            .generate_content_attr(&token, &prompt, false, &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("2 attempt"));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }
}
