//! Tool contract and registry.
//!
//! `Tool`/`ToolRegistry`/`ToolError` are generalized almost directly from the
//! teacher's `cloudllm::tool_protocol` — same map-of-name-to-`Tool` plus
//! map-of-protocol shape — extended with the tool-set grouping spec §4.3
//! asks for and the `{success: false, error}` in-band failure convention of
//! spec §4.4 (the teacher's `ToolResult` already has this shape).

pub mod builtin;

use crate::event::{topics, EventBus};
use crate::schema::{FunctionDeclaration, Schema};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Execution-time context handed to every tool handler.
#[derive(Clone)]
pub struct ToolContext {
    pub cwd: PathBuf,
    pub allowed_dirs: Vec<PathBuf>,
    pub session_id: String,
    pub execution_id: String,
    pub event_bus: Option<Arc<EventBus>>,
}

impl ToolContext {
    pub fn new(cwd: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            cwd: cwd.into(),
            allowed_dirs: Vec::new(),
            session_id: session_id.into(),
            execution_id: uuid::Uuid::new_v4().to_string(),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn sandbox(&self) -> crate::sandbox::PathSandbox {
        crate::sandbox::PathSandbox::new(self.cwd.clone()).with_allowed_dirs(self.allowed_dirs.clone())
    }

    /// Publish a `tool.call.message` banner, per spec §4.4 step 3, for tools
    /// whose declaration marks a `_display_message`.
    pub async fn announce(&self, message: impl Into<String>) {
        if let Some(bus) = &self.event_bus {
            bus.publish(topics::TOOL_CALL_MESSAGE, Arc::new(message.into()))
                .await;
        }
    }
}

/// A structured, JSON-valued tool result. Handlers never return an `Err` for
/// *operational* failures — only for malformed arguments the LLM can correct
/// by re-calling (spec §4.4 step 4).
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub success: bool,
    pub data: Map<String, Value>,
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Map::new(),
            error: Some(message.into()),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut map = self.data.clone();
        map.insert("success".to_string(), Value::Bool(self.success));
        if let Some(err) = &self.error {
            map.insert("error".to_string(), Value::String(err.clone()));
        }
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    NotFound(String),
    InvalidParameters(String),
    DuplicateRegistration(String),
    DuplicateToolSet(String),
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "tool not found: {}", name),
            ToolError::InvalidParameters(msg) => write!(f, "invalid parameters: {}", msg),
            ToolError::DuplicateRegistration(name) => {
                write!(f, "tool already registered: {}", name)
            }
            ToolError::DuplicateToolSet(name) => write!(f, "tool-set already registered: {}", name),
        }
    }
}

impl std::error::Error for ToolError {}

/// The server-side function implementing a tool call. Returns `Err` only for
/// malformed-argument bugs; operational failures are reported in-band via
/// `ToolOutcome::failure`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError>;
}

/// Renders a `ToolOutcome` for display to a human (e.g. a TUI). The default
/// formatter is a plain status line; tools with richer output (diffs, file
/// listings) override it.
pub trait ToolFormatter: Send + Sync {
    fn format(&self, outcome: &ToolOutcome) -> String {
        if outcome.success {
            "done".to_string()
        } else {
            format!("failed: {}", outcome.error.as_deref().unwrap_or("unknown error"))
        }
    }
}

struct DefaultFormatter;
impl ToolFormatter for DefaultFormatter {}

/// A named capability contract: declaration, handler, and display formatter.
pub struct Tool {
    pub declaration: FunctionDeclaration,
    /// Whether the tool must go through the confirmation protocol before its
    /// handler runs (spec §4.4 table: shell-exec optional, write-file yes).
    pub requires_confirmation: bool,
    handler: Arc<dyn ToolHandler>,
    formatter: Arc<dyn ToolFormatter>,
}

impl Tool {
    pub fn new(declaration: FunctionDeclaration, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            declaration,
            requires_confirmation: false,
            handler,
            formatter: Arc::new(DefaultFormatter),
        }
    }

    pub fn with_confirmation_required(mut self, required: bool) -> Self {
        self.requires_confirmation = required;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn ToolFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    /// Validate `args` against the declared parameter schema, then invoke
    /// the handler.
    pub async fn execute(
        &self,
        ctx: &ToolContext,
        args: &Map<String, Value>,
    ) -> Result<ToolOutcome, ToolError> {
        self.declaration
            .parameters
            .validate(&Value::Object(args.clone()))
            .map_err(ToolError::InvalidParameters)?;
        self.handler.handle(ctx, args).await
    }

    pub fn format(&self, outcome: &ToolOutcome) -> String {
        self.formatter.format(outcome)
    }
}

fn empty_response_schema() -> Schema {
    Schema::new(crate::schema::SchemaType::Object, "tool response")
}

/// Thread-safe mapping from tool name to [`Tool`], plus a mapping from
/// tool-set name to an ordered list of tool names.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<Tool>>>,
    tool_sets: RwLock<HashMap<String, Vec<String>>>,
    initialized: RwLock<Option<PathBuf>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            tool_sets: RwLock::new(HashMap::new()),
            initialized: RwLock::new(None),
        }
    }

    /// Register a tool. Tool names are unique; re-registration fails.
    pub async fn register(&self, tool: Tool) -> Result<(), ToolError> {
        let mut tools = self.tools.write().await;
        if tools.contains_key(tool.name()) {
            return Err(ToolError::DuplicateRegistration(tool.name().to_string()));
        }
        tools.insert(tool.name().to_string(), Arc::new(tool));
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Arc<Tool>, ToolError> {
        self.tools
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    pub async fn get_all(&self) -> Vec<Arc<Tool>> {
        self.tools.read().await.values().cloned().collect()
    }

    pub async fn names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    /// Register a named, ordered tool-set. Tool-set names are unique and
    /// disjoint from each other; a tool may appear in multiple sets.
    pub async fn register_tool_set(
        &self,
        name: impl Into<String>,
        tool_names: Vec<String>,
    ) -> Result<(), ToolError> {
        let name = name.into();
        let mut sets = self.tool_sets.write().await;
        if sets.contains_key(&name) {
            return Err(ToolError::DuplicateToolSet(name));
        }
        sets.insert(name, tool_names);
        Ok(())
    }

    pub async fn get_tool_set(&self, name: &str) -> Result<Vec<Arc<Tool>>, ToolError> {
        let set_names = self
            .tool_sets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let mut out = Vec::with_capacity(set_names.len());
        for tool_name in set_names {
            out.push(self.get(&tool_name).await?);
        }
        Ok(out)
    }

    pub async fn tool_set_names(&self) -> Vec<String> {
        self.tool_sets.read().await.keys().cloned().collect()
    }

    /// Idempotent: binds the registry to a working directory and, on first
    /// call, triggers discovery of external tool providers. A second call
    /// with a different `working_dir` simply re-records the latest one.
    pub async fn init(&self, working_dir: impl Into<PathBuf>) {
        *self.initialized.write().await = Some(working_dir.into());
    }

    pub async fn working_dir(&self) -> Option<PathBuf> {
        self.initialized.read().await.clone()
    }

    pub async fn execute(
        &self,
        name: &str,
        ctx: &ToolContext,
        args: &Map<String, Value>,
    ) -> Result<ToolOutcome, ToolError> {
        let tool = self.get(name).await?;
        tool.execute(ctx, args).await
    }
}
