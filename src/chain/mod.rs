//! Chain execution engine: an ordered sequence of heterogeneous steps driven
//! over a shared, mutable [`ChainContext`].
//!
//! No teacher file owns a step dispatcher directly. The overall shape —
//! a bounded loop with event emission and a "ceiling reached is not fatal,
//! take the deterministic fallback" escape hatch — is grounded on
//! `cloudllm::agent::Agent::send`'s tool-iteration loop; the step-kind tagged
//! variant and the decision fuzzy-matcher are new, built directly from
//! spec §4.6 and the design note in spec §9.

pub mod handler_registry;
pub mod step;

use crate::chain::handler_registry::HandlerRegistry;
use crate::confirmation::ConfirmationProtocol;
use crate::event::EventBus;
use crate::gateway::CancellationToken;
use crate::gateway::{LlmGateway, Prompt};
use crate::schema::Attr;
use crate::template;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub use step::{ChainFunction, ConfirmationStep, DecisionStep, FnChainFunction, GenerationAction, GenerationStep, Step};

/// Error kinds by semantic category (spec §7), not by naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Step has more than one action, duplicate chain names, etc.
    Configuration(String),
    /// A required key is missing from the merged context, or a path escapes
    /// the sandbox.
    Precondition(String),
    /// LLM/provider failure, subprocess failure, timeout.
    Transport(String),
    /// User/confirmation cancellation, context cancellation.
    Policy(String),
    /// Malformed decision response with no matching option or `DEFAULT`.
    Parsing(String),
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::Configuration(m) => write!(f, "chain configuration error: {}", m),
            ChainError::Precondition(m) => write!(f, "chain precondition failed: {}", m),
            ChainError::Transport(m) => write!(f, "chain transport error: {}", m),
            ChainError::Policy(m) => write!(f, "chain cancelled: {}", m),
            ChainError::Parsing(m) => write!(f, "chain could not parse decision: {}", m),
        }
    }
}

impl std::error::Error for ChainError {}

/// The string->string data bag threaded through a chain run, plus the
/// per-decision-step execution counters used by the loop breaker. Owned
/// exclusively by the running chain and handed down to nested chains by
/// value-reference (mutated in place), per spec §3.
#[derive(Debug, Clone, Default)]
pub struct ChainContext {
    data: HashMap<String, String>,
    decision_counts: HashMap<String, u32>,
}

impl ChainContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(data: HashMap<String, String>) -> Self {
        Self {
            data,
            decision_counts: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.data
    }

    /// Merge `local` over `self.data`, with `local` winning on collision
    /// (spec §4.6: "step overrides context").
    fn merged_with(&self, local: &HashMap<String, String>) -> HashMap<String, String> {
        let mut merged = self.data.clone();
        merged.extend(local.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    fn bump_decision_count(&mut self, step_name: &str) -> u32 {
        let counter = self.decision_counts.entry(step_name.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// Dependencies available to every step during a chain run, threaded down by
/// reference rather than reached for globally — only the [`crate::tool::ToolRegistry`]
/// and [`crate::event::EventBus`] are process-wide (spec §5); everything here
/// is constructed per run.
pub struct ChainRuntime {
    pub gateway: Arc<dyn LlmGateway>,
    pub handlers: HandlerRegistry,
    pub event_bus: Option<Arc<EventBus>>,
    pub user_confirmation: Option<Arc<ConfirmationProtocol>>,
    pub cancellation: CancellationToken,
    pub debug: bool,
    pub decision_model: String,
    pub decision_temperature: f32,
    pub decision_max_tokens: u32,
    pub confirmation_timeout: Duration,
}

impl ChainRuntime {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            gateway,
            handlers: HandlerRegistry::new(),
            event_bus: None,
            user_confirmation: None,
            cancellation: CancellationToken::new(),
            debug: false,
            decision_model: "default".to_string(),
            decision_temperature: 0.1,
            decision_max_tokens: 1000,
            confirmation_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_config(mut self, config: &crate::config::RuntimeConfig) -> Self {
        self.decision_model = config.decision_model.clone();
        self.decision_temperature = config.decision_temperature;
        self.decision_max_tokens = config.decision_max_tokens;
        self.confirmation_timeout = config.confirmation_timeout;
        self
    }

    /// Wires up an event bus and, from it, a user-confirmation protocol
    /// bound to `user.confirmation.request`/`.response` (spec §6).
    pub async fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.user_confirmation =
            Some(ConfirmationProtocol::for_user_confirmation(bus.clone(), self.confirmation_timeout).await);
        self.event_bus = Some(bus);
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// An ordered sequence of [`Step`]s executed over a shared [`ChainContext`].
pub struct Chain {
    pub name: String,
    pub steps: Vec<Step>,
    pub description_sink: Option<PathBuf>,
}

impl Chain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            description_sink: None,
        }
    }

    pub fn with_description_sink(mut self, path: impl Into<PathBuf>) -> Self {
        self.description_sink = Some(path.into());
        self
    }

    pub fn add_step(mut self, step: impl Into<Step>) -> Self {
        self.steps.push(step.into());
        self
    }

    /// Appends `other`'s steps to this chain, preserving this chain's own
    /// name and description sink (builder surface, spec §4.6).
    pub fn join(mut self, other: Chain) -> Self {
        self.steps.extend(other.steps);
        self
    }

    pub fn add_decision(
        self,
        name: impl Into<String>,
        context_text: impl Into<String>,
        options: HashMap<String, Arc<Chain>>,
    ) -> Self {
        let name = name.into();
        let mut decision = DecisionStep::new(name.clone(), context_text).with_save_as(name);
        for (key, chain) in options {
            decision = decision.with_option(key, chain);
        }
        self.add_step(decision)
    }

    pub fn add_user_confirmation(
        self,
        name: impl Into<String>,
        message: impl Into<String>,
        confirm: Arc<Chain>,
        cancel: Arc<Chain>,
    ) -> Self {
        self.add_step(ConfirmationStep::new(name, message, confirm, cancel))
    }

    /// Run every step in declared order over `ctx`, using `runtime` for the
    /// LLM gateway, event bus, and confirmation protocol. Step failure aborts
    /// the chain and surfaces the first error; context values already
    /// forwarded by earlier steps are preserved (spec §7).
    pub fn run<'a>(
        &'a self,
        ctx: &'a mut ChainContext,
        runtime: &'a ChainRuntime,
    ) -> Pin<Box<dyn Future<Output = Result<(), ChainError>> + Send + 'a>> {
        Box::pin(async move {
            for step in &self.steps {
                log::debug!("chain {:?}: dispatching step {:?}", self.name, step.name());
                match step {
                    Step::Generation(g) => run_generation_step(g, ctx, runtime).await?,
                    Step::Decision(d) => run_decision_step(d, ctx, runtime).await?,
                    Step::Confirmation(c) => run_confirmation_step(c, ctx, runtime).await?,
                }
            }
            if let Some(sink) = &self.description_sink {
                let description = self.render_description();
                if let Err(e) = tokio::fs::write(sink, description).await {
                    log::warn!("chain {:?}: failed to write description to {:?}: {}", self.name, sink, e);
                }
            }
            Ok(())
        })
    }

    /// Render a plain-text description of this chain: name, step count, and
    /// per-step metadata (forward-as, save-as, cache, requires, prompt name
    /// or template file, local context) — spec §6.
    pub fn render_description(&self) -> String {
        let mut out = format!("Chain: {}\nSteps: {}\n\n", self.name, self.steps.len());
        for (i, step) in self.steps.iter().enumerate() {
            out.push_str(&format!("{}. {} ({})\n", i + 1, step.name(), step_kind(step)));
            match step {
                Step::Generation(g) => {
                    out.push_str(&format!("   requires: {:?}\n", g.requires));
                    out.push_str(&format!("   cache: {}\n", g.cache));
                    if let Some(p) = &g.save_as {
                        out.push_str(&format!("   save_as: {}\n", p.display()));
                    }
                    if let Some(k) = &g.forward_as {
                        out.push_str(&format!("   forward_as: {}\n", k));
                    }
                    match &g.action {
                        GenerationAction::Prompt(p) => out.push_str(&format!("   prompt: {}\n", p.name)),
                        GenerationAction::Function(_) => out.push_str("   action: function\n"),
                        GenerationAction::TemplateFile(p) => {
                            out.push_str(&format!("   template_file: {}\n", p.display()))
                        }
                    }
                    if !g.local_context.is_empty() {
                        out.push_str(&format!("   local_context: {:?}\n", g.local_context));
                    }
                }
                Step::Decision(d) => {
                    let mut keys: Vec<&String> = d.options.keys().collect();
                    keys.sort();
                    out.push_str(&format!("   options: {:?}\n", keys));
                    if let Some(k) = &d.save_as {
                        out.push_str(&format!("   save_as: {}\n", k));
                    }
                }
                Step::Confirmation(c) => {
                    if let Some(k) = &c.save_as {
                        out.push_str(&format!("   save_as: {}\n", k));
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

fn step_kind(step: &Step) -> &'static str {
    match step {
        Step::Generation(_) => "generation",
        Step::Decision(_) => "decision",
        Step::Confirmation(_) => "confirmation",
    }
}

/// Internal progression of a [`GenerationStep`], for debug logging only.
/// Errors at any state terminate the chain with that error; partial state
/// already written to `ChainContext` by earlier steps is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    Pending,
    CacheHit,
    Executing,
    SavedRaw,
    HandlerApplied,
    Forwarded,
    Done,
}

async fn run_generation_step(
    step: &GenerationStep,
    ctx: &mut ChainContext,
    runtime: &ChainRuntime,
) -> Result<(), ChainError> {
    log::debug!("step {:?}: {:?}", step.name, StepState::Pending);

    let raw_output = if step.cache {
        if let Some(path) = &step.save_as {
            if path.is_file() {
                log::debug!("step {:?}: {:?} at {:?}", step.name, StepState::CacheHit, path);
                Some(
                    tokio::fs::read_to_string(path)
                        .await
                        .map_err(|e| ChainError::Transport(format!("reading cache file {:?}: {}", path, e)))?,
                )
            } else {
                None
            }
        } else {
            None
        }
    } else {
        None
    };

    let raw_output = match raw_output {
        Some(cached) => cached,
        None => {
            log::debug!("step {:?}: {:?}", step.name, StepState::Executing);
            let all_data = ctx.merged_with(&step.local_context);
            for key in &step.requires {
                if !all_data.contains_key(key) {
                    return Err(ChainError::Precondition(format!(
                        "step {:?} requires key {:?}, absent from merged context",
                        step.name, key
                    )));
                }
            }

            match &step.action {
                GenerationAction::Prompt(prompt) => {
                    let attrs: Vec<Attr> = all_data
                        .iter()
                        .map(|(k, v)| Attr::new(k.clone(), v.clone()))
                        .collect();
                    runtime
                        .gateway
                        .generate_content_attr(&runtime.cancellation, prompt, runtime.debug, &attrs)
                        .await
                        .map_err(|e| ChainError::Transport(e.to_string()))?
                }
                GenerationAction::Function(function) => function.call(&all_data, runtime.debug).await?,
                GenerationAction::TemplateFile(path) => template::render_file(path, &all_data)
                    .map_err(|e| ChainError::Transport(format!("rendering template {:?}: {}", path, e)))?,
            }
        }
    };

    if let Some(path) = &step.save_as {
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        tokio::fs::write(path, &raw_output)
            .await
            .map_err(|e| ChainError::Transport(format!("writing save_as {:?}: {}", path, e)))?;
        log::debug!("step {:?}: {:?} -> {:?}", step.name, StepState::SavedRaw, path);
    }

    let final_output = if let Some(handler_name) = &step.response_handler {
        let handler = runtime.handlers.get(handler_name).ok_or_else(|| {
            ChainError::Configuration(format!("no response handler registered named {:?}", handler_name))
        })?;
        log::debug!("step {:?}: {:?} via {:?}", step.name, StepState::HandlerApplied, handler_name);
        handler.handle(&raw_output)
    } else {
        raw_output
    };

    if let Some(key) = &step.forward_as {
        ctx.set(key.clone(), final_output);
        log::debug!("step {:?}: {:?} as {:?}", step.name, StepState::Forwarded, key);
    }

    log::debug!("step {:?}: {:?}", step.name, StepState::Done);
    Ok(())
}

async fn run_decision_step(step: &DecisionStep, ctx: &mut ChainContext, runtime: &ChainRuntime) -> Result<(), ChainError> {
    let count = ctx.bump_decision_count(&step.name);

    let chosen_key = if count > 3 {
        let fallback = if step.options.contains_key("CLEAR") {
            "CLEAR".to_string()
        } else {
            let mut keys: Vec<&String> = step.options.keys().collect();
            keys.sort();
            keys.into_iter()
                .next()
                .cloned()
                .ok_or_else(|| ChainError::Configuration(format!("decision step {:?} has no options", step.name)))?
        };
        log::warn!(
            "decision step {:?}: loop breaker tripped at entry {}, taking fallback {:?} without calling the LLM",
            step.name,
            count,
            fallback
        );
        fallback
    } else {
        let mut sorted_keys: Vec<&String> = step.options.keys().collect();
        sorted_keys.sort();
        let bullets: String = sorted_keys
            .iter()
            .map(|k| format!("- {}", k))
            .collect::<Vec<_>>()
            .join("\n");
        let text = format!("{}\n\nOptions:\n{}", step.context_text, bullets);

        let mut prompt = Prompt::new(
            format!("decision::{}", step.name),
            "Choose exactly one option key from the list below. Respond with only the option key, nothing else.",
            text,
        );
        prompt.model = runtime.decision_model.clone();
        prompt.temperature = runtime.decision_temperature;
        prompt.max_output_tokens = runtime.decision_max_tokens;

        let response = runtime
            .gateway
            .generate_content_attr(&runtime.cancellation, &prompt, runtime.debug, &[])
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let normalized = normalize_decision_response(&response);
        match match_option(&normalized, &step.options) {
            Some(key) => key,
            None => step
                .options
                .get("DEFAULT")
                .map(|_| "DEFAULT".to_string())
                .ok_or_else(|| {
                    let mut valid: Vec<&String> = step.options.keys().collect();
                    valid.sort();
                    ChainError::Parsing(format!(
                        "decision step {:?} returned {:?}, which matches none of {:?}",
                        step.name, response, valid
                    ))
                })?,
        }
    };

    if let Some(key) = &step.save_as {
        ctx.set(key.clone(), chosen_key.clone());
    }

    let child = step
        .options
        .get(&chosen_key)
        .ok_or_else(|| ChainError::Configuration(format!("decision step {:?}: no chain for option {:?}", step.name, chosen_key)))?;
    child.run(ctx, runtime).await
}

/// Trim whitespace and strip one layer of surrounding `"`, `'`, or backticks.
fn normalize_decision_response(response: &str) -> String {
    let trimmed = response.trim();
    let stripped = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .or_else(|| trimmed.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
        .unwrap_or(trimmed);
    stripped.trim().to_string()
}

/// Priority: (a) exact case-insensitive, (b) option key starts with the
/// response, (c) either contains the other, case-insensitively. Ties within
/// a tier are broken by sorting candidate keys alphabetically first, so
/// matching is deterministic.
fn match_option(response: &str, options: &HashMap<String, Arc<Chain>>) -> Option<String> {
    let response_lower = response.to_lowercase();
    let mut keys: Vec<&String> = options.keys().collect();
    keys.sort();

    for key in &keys {
        if key.to_lowercase() == response_lower {
            return Some((*key).clone());
        }
    }
    for key in &keys {
        if key.to_lowercase().starts_with(&response_lower) {
            return Some((*key).clone());
        }
    }
    for key in &keys {
        let key_lower = key.to_lowercase();
        if key_lower.contains(&response_lower) || response_lower.contains(&key_lower) {
            return Some((*key).clone());
        }
    }
    None
}

async fn run_confirmation_step(
    step: &ConfirmationStep,
    ctx: &mut ChainContext,
    runtime: &ChainRuntime,
) -> Result<(), ChainError> {
    let message = template::render(&step.message, ctx.as_map());

    let confirmed = match &runtime.user_confirmation {
        None => true,
        Some(protocol) => protocol
            .request(
                "chain-runner",
                step.name.clone(),
                message,
                None,
                None,
                runtime.cancellation.cancelled(),
            )
            .await
            .map_err(|e| ChainError::Policy(e.to_string()))?,
    };

    if let Some(key) = &step.save_as {
        ctx.set(key.clone(), if confirmed { "true" } else { "false" });
    }

    let branch = if confirmed { &step.confirm } else { &step.cancel };
    branch.run(ctx, runtime).await
}
