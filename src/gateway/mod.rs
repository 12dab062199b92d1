//! Provider-agnostic LLM gateway.
//!
//! The trait shape — `Message`/`Role`/`TokenUsage`/stream type aliases — is
//! carried over almost verbatim from the teacher's
//! `cloudllm::client_wrapper::ClientWrapper`; the bounded function-calling
//! loop borrows its ceiling-reached-is-not-an-error structure from
//! `cloudllm::agent::Agent::send`. Concrete provider wrappers (OpenAI,
//! Claude, Gemini, ...) are out of scope per spec §1 — only the trait and the
//! loop that drives any implementation of it live here.

pub mod capture_middleware;
pub mod retry;

use crate::schema::{Attr, FunctionDeclaration};
use crate::template;
use async_trait::async_trait;
use futures_util::stream::Stream;
use std::collections::HashMap;
use std::error::Error;
use std::pin::Pin;
use std::sync::Arc;
pub use tokio_util::sync::CancellationToken;

/// Speaker role of a [`Message`] in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool { call_id: String },
}

/// A tool call the model asked the gateway to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: Arc<str>,
    pub tool_calls: Vec<NativeToolCall>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<Arc<str>>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// A streamed fragment of a generation.
#[derive(Debug, Clone, Default)]
pub struct MessageChunk {
    pub text: String,
    pub thinking: String,
    pub tool_calls: Vec<NativeToolCall>,
    pub token_count: Option<TokenUsage>,
    /// Set on the terminal chunk of the stream — the end-of-stream sentinel.
    pub finish_reason: Option<String>,
}

impl MessageChunk {
    pub fn is_end_of_stream(&self) -> bool {
        self.finish_reason.is_some()
    }
}

pub type GatewayError = Box<dyn Error + Send + Sync>;
pub type MessageChunkStream = Pin<Box<dyn Stream<Item = Result<MessageChunk, GatewayError>> + Send>>;

/// A handler invoked by the function-calling loop when the provider returns a
/// tool call by that name.
#[async_trait]
pub trait ToolHandlerFn: Send + Sync {
    async fn call(&self, arguments: &str) -> Result<String, GatewayError>;
}

/// Model parameters plus templated instruction/text, per spec §3.
#[derive(Clone)]
pub struct Prompt {
    pub name: String,
    pub instruction: String,
    pub text: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tool_calls: u32,
    pub context_budget: u32,
    pub functions: Vec<FunctionDeclaration>,
    pub handlers: HashMap<String, Arc<dyn ToolHandlerFn>>,
    pub response_schema: Option<crate::schema::Schema>,
    pub required_tool_set: Option<String>,
}

impl Prompt {
    pub fn new(name: impl Into<String>, instruction: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            text: text.into(),
            model: "default".to_string(),
            max_output_tokens: 2048,
            temperature: 0.7,
            top_p: 1.0,
            max_tool_calls: 3,
            context_budget: 8192,
            functions: Vec::new(),
            handlers: HashMap::new(),
            response_schema: None,
            required_tool_set: None,
        }
    }

    pub fn with_max_tool_calls(mut self, n: u32) -> Self {
        self.max_tool_calls = n;
        self
    }

    pub fn with_function(mut self, decl: FunctionDeclaration, handler: Arc<dyn ToolHandlerFn>) -> Self {
        self.handlers.insert(decl.name.clone(), handler);
        self.functions.push(decl);
        self
    }

    /// Render a *copy* of this prompt's instruction/text against `attrs`.
    /// Rendering is pure and idempotent: the receiver is never mutated.
    pub fn render(&self, attrs: &[Attr]) -> RenderedPrompt {
        let map = Attr::list_to_map(attrs);
        let instruction = template::unescape_markers(&self.instruction);
        RenderedPrompt {
            instruction: template::render(&instruction, &map),
            text: template::render(&self.text, &map),
        }
    }
}

pub struct RenderedPrompt {
    pub instruction: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready,
    Degraded(String),
    Unavailable(String),
}

/// The provider-agnostic gateway contract. All operations are
/// cancellable via `token`.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn generate_content(
        &self,
        token: &CancellationToken,
        prompt: &Prompt,
        debug: bool,
        args: &[&str],
    ) -> Result<String, GatewayError> {
        let attrs: Vec<Attr> = args
            .iter()
            .enumerate()
            .map(|(i, v)| Attr::new(format!("arg{}", i), *v))
            .collect();
        self.generate_content_attr(token, prompt, debug, &attrs).await
    }

    async fn generate_content_attr(
        &self,
        token: &CancellationToken,
        prompt: &Prompt,
        debug: bool,
        attrs: &[Attr],
    ) -> Result<String, GatewayError>;

    async fn generate_content_stream(
        &self,
        token: &CancellationToken,
        prompt: &Prompt,
        debug: bool,
        args: &[&str],
    ) -> Result<MessageChunkStream, GatewayError> {
        let attrs: Vec<Attr> = args
            .iter()
            .enumerate()
            .map(|(i, v)| Attr::new(format!("arg{}", i), *v))
            .collect();
        self.generate_content_attr_stream(token, prompt, debug, &attrs).await
    }

    async fn generate_content_attr_stream(
        &self,
        token: &CancellationToken,
        prompt: &Prompt,
        debug: bool,
        attrs: &[Attr],
    ) -> Result<MessageChunkStream, GatewayError>;

    async fn count_tokens(
        &self,
        token: &CancellationToken,
        prompt: &Prompt,
        debug: bool,
        args: &[&str],
    ) -> Result<TokenUsage, GatewayError>;

    fn status(&self) -> Status {
        Status::Ready
    }
}

/// Run the bounded function-calling loop described in spec §4.2: repeatedly
/// call `call_model` and, while it returns tool calls, invoke each declared
/// handler and feed the result back, up to `prompt.max_tool_calls` rounds.
/// Reaching the ceiling is not an error — the last model turn is returned.
pub async fn run_tool_loop<F, Fut>(
    prompt: &Prompt,
    mut history: Vec<Message>,
    mut call_model: F,
) -> Result<Message, GatewayError>
where
    F: FnMut(Vec<Message>) -> Fut,
    Fut: std::future::Future<Output = Result<Message, GatewayError>>,
{
    let max_calls = if prompt.max_tool_calls == 0 {
        1
    } else {
        prompt.max_tool_calls
    };

    for iteration in 0..max_calls {
        let response = call_model(history.clone()).await?;
        if response.tool_calls.is_empty() {
            return Ok(response);
        }

        log::debug!(
            "tool loop iteration {}/{}: {} tool call(s)",
            iteration + 1,
            max_calls,
            response.tool_calls.len()
        );

        history.push(response.clone());
        for call in &response.tool_calls {
            let result = match prompt.handlers.get(&call.name) {
                Some(handler) => handler
                    .call(&call.arguments)
                    .await
                    .unwrap_or_else(|e| format!("{{\"error\": {:?}}}", e.to_string())),
                None => format!("{{\"error\": \"no handler registered for {}\"}}", call.name),
            };
            history.push(Message::new(
                Role::Tool {
                    call_id: call.id.clone(),
                },
                result,
            ));
        }

        if iteration + 1 == max_calls {
            log::warn!(
                "tool loop reached its {}-call ceiling for prompt {:?}; returning last turn",
                max_calls,
                prompt.name
            );
            return call_model(history).await;
        }
    }
    unreachable!("loop always returns within max_calls iterations")
}

/// Serialize `functions` to the `{name, description, parameters, response}`
/// shape providers expect for function-calling declarations (spec §6).
pub fn declarations_to_json(functions: &[FunctionDeclaration]) -> serde_json::Value {
    serde_json::to_value(functions).unwrap_or(serde_json::Value::Null)
}
