//! The three step kinds a [`crate::chain::Chain`] is built from.
//!
//! Modeled as a tagged `enum` with explicit discrimination at dispatch, per
//! the design note in spec §9 ("heterogeneous step list: model as a tagged
//! variant with explicit discrimination at dispatch, not via dynamic type
//! tests"). No teacher file owns a step dispatcher directly; the overall
//! "loop with a ceiling, event emission" shape is grounded on
//! `cloudllm::agent::Agent::send`'s tool-iteration loop.

use crate::gateway::Prompt;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::ChainError;

/// A pure function action for a [`GenerationStep`], the second of the three
/// mutually-exclusive action kinds (spec §3: "EXACTLY ONE of {prompt, pure
/// function, template file}").
#[async_trait]
pub trait ChainFunction: Send + Sync {
    async fn call(&self, data: &HashMap<String, String>, debug: bool) -> Result<String, ChainError>;
}

/// A function built from a plain closure.
pub struct FnChainFunction<F>(pub F)
where
    F: Fn(&HashMap<String, String>, bool) -> Result<String, ChainError> + Send + Sync;

#[async_trait]
impl<F> ChainFunction for FnChainFunction<F>
where
    F: Fn(&HashMap<String, String>, bool) -> Result<String, ChainError> + Send + Sync,
{
    async fn call(&self, data: &HashMap<String, String>, debug: bool) -> Result<String, ChainError> {
        (self.0)(data, debug)
    }
}

/// Exactly one of these three drives a [`GenerationStep`]'s execution.
pub enum GenerationAction {
    Prompt(Prompt),
    Function(Arc<dyn ChainFunction>),
    TemplateFile(PathBuf),
}

/// A single generation-producing step: a prompt call, a pure function call,
/// or a template render, over the shared context.
pub struct GenerationStep {
    pub name: String,
    /// Overlays `chainContext` for this step only; step values win on
    /// collision (spec §4.6: "step overrides context").
    pub local_context: HashMap<String, String>,
    /// Keys that must be present in `chainContext ⊕ local_context` or the
    /// chain fails before execution.
    pub requires: Vec<String>,
    /// If set and `cache` is true and the file already exists as a regular
    /// file, its bytes are loaded as the step's output instead of executing.
    pub save_as: Option<PathBuf>,
    pub forward_as: Option<String>,
    pub cache: bool,
    pub response_handler: Option<String>,
    pub action: GenerationAction,
}

impl GenerationStep {
    pub fn new(name: impl Into<String>, action: GenerationAction) -> Self {
        Self {
            name: name.into(),
            local_context: HashMap::new(),
            requires: Vec::new(),
            save_as: None,
            forward_as: None,
            cache: false,
            response_handler: None,
            action,
        }
    }

    pub fn with_local_context(mut self, ctx: HashMap<String, String>) -> Self {
        self.local_context = ctx;
        self
    }

    pub fn with_requires(mut self, keys: Vec<String>) -> Self {
        self.requires = keys;
        self
    }

    pub fn with_save_as(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_as = Some(path.into());
        self
    }

    pub fn with_forward_as(mut self, key: impl Into<String>) -> Self {
        self.forward_as = Some(key.into());
        self
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_response_handler(mut self, name: impl Into<String>) -> Self {
        self.response_handler = Some(name.into());
        self
    }
}

/// An LLM-chooses-branch step, with fuzzy matching and a loop breaker (spec
/// §4.6, point 2).
pub struct DecisionStep {
    pub name: String,
    /// Free-form context text prepended to the synthetic decision prompt.
    pub context_text: String,
    /// option key -> child chain to run when that option is chosen.
    pub options: HashMap<String, Arc<super::Chain>>,
    pub save_as: Option<String>,
}

impl DecisionStep {
    pub fn new(name: impl Into<String>, context_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context_text: context_text.into(),
            options: HashMap::new(),
            save_as: None,
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, chain: Arc<super::Chain>) -> Self {
        self.options.insert(key.into(), chain);
        self
    }

    pub fn with_save_as(mut self, key: impl Into<String>) -> Self {
        self.save_as = Some(key.into());
        self
    }
}

/// An out-of-band user-confirmation step (spec §4.6, point 3).
pub struct ConfirmationStep {
    pub name: String,
    /// `{{.key}}`-templated message shown to the user.
    pub message: String,
    pub confirm: Arc<super::Chain>,
    pub cancel: Arc<super::Chain>,
    pub save_as: Option<String>,
}

impl ConfirmationStep {
    pub fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        confirm: Arc<super::Chain>,
        cancel: Arc<super::Chain>,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            confirm,
            cancel,
            save_as: None,
        }
    }

    pub fn with_save_as(mut self, key: impl Into<String>) -> Self {
        self.save_as = Some(key.into());
        self
    }
}

/// Tagged variant over the three step kinds, dispatched explicitly by
/// [`super::Chain::run`] rather than via any dynamic type test.
pub enum Step {
    Generation(GenerationStep),
    Decision(DecisionStep),
    Confirmation(ConfirmationStep),
}

impl Step {
    pub fn name(&self) -> &str {
        match self {
            Step::Generation(s) => &s.name,
            Step::Decision(s) => &s.name,
            Step::Confirmation(s) => &s.name,
        }
    }
}

impl From<GenerationStep> for Step {
    fn from(s: GenerationStep) -> Self {
        Step::Generation(s)
    }
}

impl From<DecisionStep> for Step {
    fn from(s: DecisionStep) -> Self {
        Step::Decision(s)
    }
}

impl From<ConfirmationStep> for Step {
    fn from(s: ConfirmationStep) -> Self {
        Step::Confirmation(s)
    }
}
