//! Process sessions: the identity and working-directory scope a chain run,
//! tool call, or skill invocation executes under.
//!
//! Grounded on `cloudllm::agent::Agent`'s identity/metadata shape (a session
//! carries an id, a persona/system-prompt-ish string, and builder methods for
//! attaching collaborators) generalized to the runtime's needs: a working
//! directory for the path sandbox, an optional tool-set overlay restricting
//! which registered tools are visible, and the event bus a session's
//! [`crate::tool::ToolContext`]s and [`crate::skill::SkillContext`] are bound
//! to.

use crate::event::EventBus;
use crate::skill::SkillContext;
use crate::tool::ToolContext;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// A running session: one working directory, one identity, one event bus.
pub struct Session {
    id: String,
    working_dir: PathBuf,
    /// Free-form persona/system-prompt text, set by `skill.invoked`/the
    /// caller; distinct from the `SkillContext`'s bundle, which also carries
    /// the skill's name for event payloads.
    persona: Option<String>,
    /// When set, only tools whose name appears here (or is in one of the
    /// named tool-sets) are reachable for this session. `None` means no
    /// overlay: every registered tool is visible.
    tool_overlay: Option<Vec<String>>,
    event_bus: Arc<EventBus>,
    skills: SkillContext,
}

impl Session {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let id = Uuid::new_v4().to_string();
        let event_bus = Arc::new(EventBus::new());
        Self {
            skills: SkillContext::new(id.clone()).with_event_bus(event_bus.clone()),
            id,
            working_dir: working_dir.into(),
            persona: None,
            tool_overlay: None,
            event_bus,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.skills = SkillContext::new(self.id.clone()).with_event_bus(bus.clone());
        self.event_bus = bus;
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn with_tool_overlay(mut self, tools: Vec<String>) -> Self {
        self.tool_overlay = Some(tools);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn persona(&self) -> Option<&str> {
        self.persona.as_deref()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn skills(&self) -> &SkillContext {
        &self.skills
    }

    /// True if `tool_name` is reachable from this session — always true with
    /// no overlay set, otherwise only for names the overlay lists.
    pub fn allows_tool(&self, tool_name: &str) -> bool {
        match &self.tool_overlay {
            None => true,
            Some(allowed) => allowed.iter().any(|t| t == tool_name),
        }
    }

    /// Build a [`ToolContext`] scoped to this session's working directory,
    /// id, and event bus.
    pub fn tool_context(&self) -> ToolContext {
        ToolContext::new(self.working_dir.clone(), self.id.clone()).with_event_bus(self.event_bus.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_allows_every_tool_with_no_overlay() {
        let session = Session::new(".");
        assert!(session.allows_tool("shell-exec"));
        assert!(session.allows_tool("anything"));
    }

    #[test]
    fn tool_overlay_restricts_visibility() {
        let session = Session::new(".").with_tool_overlay(vec!["read-file".to_string()]);
        assert!(session.allows_tool("read-file"));
        assert!(!session.allows_tool("shell-exec"));
    }

    #[test]
    fn tool_context_inherits_working_dir_and_session_id() {
        let session = Session::new("/tmp/work");
        let ctx = session.tool_context();
        assert_eq!(ctx.cwd, PathBuf::from("/tmp/work"));
        assert_eq!(ctx.session_id, session.id());
    }

    #[tokio::test]
    async fn skill_invocation_goes_through_the_sessions_own_bus() {
        let session = Session::new(".");
        session
            .skills()
            .invoke(crate::skill::SkillBundle {
                name: "reviewer".to_string(),
                instructions: "be thorough".to_string(),
            })
            .await;
        assert_eq!(
            session.skills().active().await.map(|s| s.name),
            Some("reviewer".to_string())
        );
    }
}
