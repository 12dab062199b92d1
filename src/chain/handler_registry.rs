//! Context-scoped response-handler registry.
//!
//! Spec §5 is explicit that "the handler registry is passed through the
//! chain context, not globally" — unlike [`crate::tool::ToolRegistry`], which
//! is process-wide, a [`HandlerRegistry`] is built per chain run and handed
//! down by reference to nested chains, the same way `ChainContext` itself is.

use std::collections::HashMap;
use std::sync::Arc;

/// Post-processes a [`crate::chain::step::GenerationStep`]'s raw output
/// before it is forwarded, per spec §4.6 step 1 ("if `ResponseHandler`
/// non-empty, retrieve the named handler ... and replace output with its
/// processed result"). The *raw* output is still what gets persisted to
/// `SaveAs` — see the open question in spec §9, preserved as written.
pub trait ResponseHandler: Send + Sync {
    fn handle(&self, raw: &str) -> String;
}

/// A handler built from a plain closure, for callers that don't want to name
/// a type for a one-off transform.
pub struct FnHandler<F>(pub F)
where
    F: Fn(&str) -> String + Send + Sync;

impl<F> ResponseHandler for FnHandler<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn handle(&self, raw: &str) -> String {
        (self.0)(raw)
    }
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ResponseHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ResponseHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ResponseHandler>> {
        self.handlers.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_handler_transforms_output() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            "uppercase",
            Arc::new(FnHandler(|s: &str| s.to_uppercase())),
        );
        let handler = registry.get("uppercase").unwrap();
        assert_eq!(handler.handle("hi"), "HI");
    }

    #[test]
    fn unregistered_name_returns_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.get("missing").is_none());
    }
}
