//! `task`: spawn an isolated sub-session for deep research, bounded by the
//! default 2-minute task-tool timeout (spec §5).
//!
//! No teacher file spawns sub-agents directly; the "one isolated call to the
//! gateway, bounded by a timeout" shape is grounded on
//! `cloudllm::agent::Agent::send`'s single-exchange structure, stripped of
//! its own tool loop since a task's objective is answered by one model turn
//! against an isolated [`Prompt`] rather than recursing into the caller's
//! own tool set.

use crate::gateway::{CancellationToken, LlmGateway, Prompt};
use crate::schema::{FunctionDeclaration, Schema, SchemaType};
use crate::tool::{Tool, ToolContext, ToolError, ToolHandler, ToolOutcome};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub struct TaskHandler {
    gateway: Arc<dyn LlmGateway>,
    model: String,
    timeout: Duration,
}

impl TaskHandler {
    pub fn new(gateway: Arc<dyn LlmGateway>, model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ToolHandler for TaskHandler {
    async fn handle(&self, _ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let Some(objective) = args.get("objective").and_then(Value::as_str) else {
            return Err(ToolError::InvalidParameters("missing string field 'objective'".to_string()));
        };

        let mut prompt = Prompt::new(
            "task",
            "You are an isolated sub-session. Research the objective and report findings concisely.",
            objective,
        )
        .with_max_tool_calls(1);
        prompt.model = self.model.clone();

        let token = CancellationToken::new();
        let run = self.gateway.generate_content(&token, &prompt, false, &[]);

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(content)) => {
                let mut data = Map::new();
                data.insert("content".to_string(), Value::String(content));
                Ok(ToolOutcome::success(data))
            }
            Ok(Err(e)) => Ok(ToolOutcome::failure(e.to_string())),
            Err(_) => {
                token.cancel();
                Ok(ToolOutcome::failure(format!(
                    "task exceeded {}s timeout",
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

pub fn task_tool(handler: TaskHandler) -> Tool {
    Tool::new(
        FunctionDeclaration::new(
            "task",
            "Spawn an isolated sub-session to research an objective and report back",
            Schema::new(SchemaType::Object, "task arguments")
                .with_required(vec!["objective".to_string()])
                .with_property("objective", Schema::new(SchemaType::String, "what the sub-session should research")),
            Schema::new(SchemaType::Object, "task response"),
        ),
        Arc::new(handler),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, MessageChunkStream, Status, TokenUsage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockGateway {
        calls: AtomicUsize,
        response: String,
    }

    #[async_trait]
    impl LlmGateway for MockGateway {
        async fn generate_content_attr(
            &self,
            _token: &CancellationToken,
            _prompt: &Prompt,
            _debug: bool,
            _attrs: &[crate::schema::Attr],
        ) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }

        async fn generate_content_attr_stream(
            &self,
            _token: &CancellationToken,
            _prompt: &Prompt,
            _debug: bool,
            _attrs: &[crate::schema::Attr],
        ) -> Result<MessageChunkStream, GatewayError> {
            unimplemented!("not exercised by task tool tests")
        }

        async fn count_tokens(
            &self,
            _token: &CancellationToken,
            _prompt: &Prompt,
            _debug: bool,
            _args: &[&str],
        ) -> Result<TokenUsage, GatewayError> {
            unimplemented!("not exercised by task tool tests")
        }

        fn status(&self) -> Status {
            Status::Ready
        }
    }

    fn args(objective: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("objective".to_string(), Value::String(objective.to_string()));
        m
    }

    #[tokio::test]
    async fn runs_one_isolated_call_and_returns_its_content() {
        let gateway = Arc::new(MockGateway {
            calls: AtomicUsize::new(0),
            response: "findings: none relevant".to_string(),
        });
        let handler = TaskHandler::new(gateway.clone(), "gpt-5");
        let ctx = ToolContext::new(".", "s1");
        let outcome = handler.handle(&ctx, &args("survey the landscape")).await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.data.get("content").and_then(Value::as_str),
            Some("findings: none relevant")
        );
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_objective_is_a_schema_error() {
        let gateway = Arc::new(MockGateway {
            calls: AtomicUsize::new(0),
            response: String::new(),
        });
        let handler = TaskHandler::new(gateway, "gpt-5");
        let ctx = ToolContext::new(".", "s1");
        let err = handler.handle(&ctx, &Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
