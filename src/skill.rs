//! Skill context: tracks the currently loaded skill instruction bundle and
//! emits `skill.invoked`/`skill.cleared` transitions on the event bus.
//!
//! Skill *content loading* (reading a persona/skill file off disk) is an
//! explicit out-of-scope external collaborator per spec §1 ("skill content
//! loader"); this module only owns the in-memory transition and the event it
//! fires, grounded on `cloudllm::agent::Agent`'s identity/metadata shape for
//! what a "currently active" bundle looks like.

use crate::event::{topics, EventBus};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A loaded skill instruction bundle: a name and its rendered instruction
/// text. Content loading itself is the caller's job (spec §1); this struct
/// just carries whatever was already loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillBundle {
    pub name: String,
    pub instructions: String,
}

/// Payload published on `skill.invoked`.
#[derive(Debug, Clone)]
pub struct SkillInvoked {
    pub session_id: String,
    pub skill: SkillBundle,
}

/// Payload published on `skill.cleared`.
#[derive(Debug, Clone)]
pub struct SkillCleared {
    pub session_id: String,
    pub previous: Option<SkillBundle>,
}

/// Tracks the single currently-active skill bundle for a session.
pub struct SkillContext {
    session_id: String,
    active: RwLock<Option<SkillBundle>>,
    event_bus: Option<Arc<EventBus>>,
}

impl SkillContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            active: RwLock::new(None),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Load `skill`, replacing whatever was active, and publish
    /// `skill.invoked`.
    pub async fn invoke(&self, skill: SkillBundle) {
        *self.active.write().await = Some(skill.clone());
        if let Some(bus) = &self.event_bus {
            bus.publish(
                topics::SKILL_INVOKED,
                Arc::new(SkillInvoked {
                    session_id: self.session_id.clone(),
                    skill,
                }),
            )
            .await;
        }
    }

    /// Unload the active skill, if any, and publish `skill.cleared`.
    pub async fn clear(&self) {
        let previous = self.active.write().await.take();
        if let Some(bus) = &self.event_bus {
            bus.publish(
                topics::SKILL_CLEARED,
                Arc::new(SkillCleared {
                    session_id: self.session_id.clone(),
                    previous,
                }),
            )
            .await;
        }
    }

    pub async fn active(&self) -> Option<SkillBundle> {
        self.active.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Handler, Payload};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordTopics(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Handler for RecordTopics {
        async fn handle(&self, topic: &str, _payload: Payload) {
            self.0.lock().unwrap().push(topic.to_string());
        }
    }

    #[tokio::test]
    async fn invoke_then_clear_publishes_both_transitions_in_order() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(topics::SKILL_INVOKED, Arc::new(RecordTopics(seen.clone()))).await;
        bus.subscribe(topics::SKILL_CLEARED, Arc::new(RecordTopics(seen.clone()))).await;

        let ctx = SkillContext::new("s1").with_event_bus(bus);
        ctx.invoke(SkillBundle {
            name: "reviewer".to_string(),
            instructions: "review code".to_string(),
        })
        .await;
        assert_eq!(ctx.active().await.map(|s| s.name), Some("reviewer".to_string()));

        ctx.clear().await;
        assert_eq!(ctx.active().await, None);
        assert_eq!(*seen.lock().unwrap(), vec![topics::SKILL_INVOKED, topics::SKILL_CLEARED]);
    }
}
