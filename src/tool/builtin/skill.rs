//! `skill`: load or clear a skill instruction bundle.
//!
//! Thin adapter over [`crate::skill::SkillContext`] — the same
//! handler-parses-arguments-then-delegates shape as `todo.rs`. Reading skill
//! content off disk is the caller's job (spec §1's "skill content loader" is
//! an explicit out-of-scope external collaborator); this handler only takes
//! an already-loaded name/instructions pair, or `action: "clear"`.

use crate::schema::{FunctionDeclaration, Schema, SchemaType};
use crate::skill::{SkillBundle, SkillContext};
use crate::tool::{Tool, ToolContext, ToolError, ToolHandler, ToolOutcome};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct SkillHandler {
    skills: Arc<SkillContext>,
}

impl SkillHandler {
    pub fn new(skills: Arc<SkillContext>) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl ToolHandler for SkillHandler {
    async fn handle(&self, _ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let action = args.get("action").and_then(Value::as_str).unwrap_or("invoke");

        match action {
            "clear" => {
                self.skills.clear().await;
                Ok(ToolOutcome::success(Map::new()))
            }
            "invoke" => {
                let Some(name) = args.get("name").and_then(Value::as_str) else {
                    return Err(ToolError::InvalidParameters("missing string field 'name'".to_string()));
                };
                let Some(instructions) = args.get("instructions").and_then(Value::as_str) else {
                    return Err(ToolError::InvalidParameters(
                        "missing string field 'instructions'".to_string(),
                    ));
                };
                self.skills
                    .invoke(SkillBundle {
                        name: name.to_string(),
                        instructions: instructions.to_string(),
                    })
                    .await;
                let mut data = Map::new();
                data.insert("name".to_string(), Value::String(name.to_string()));
                Ok(ToolOutcome::success(data))
            }
            other => Ok(ToolOutcome::failure(format!("unknown skill action: {}", other))),
        }
    }
}

pub fn skill_tool(skills: Arc<SkillContext>) -> Tool {
    Tool::new(
        FunctionDeclaration::new(
            "skill",
            "Load or clear a skill instruction bundle",
            Schema::new(SchemaType::Object, "skill arguments")
                .with_required(vec!["action".to_string()])
                .with_property(
                    "action",
                    Schema::new(SchemaType::String, "'invoke' or 'clear'").with_enum(vec![
                        "invoke".to_string(),
                        "clear".to_string(),
                    ]),
                )
                .with_property("name", Schema::new(SchemaType::String, "skill name"))
                .with_property(
                    "instructions",
                    Schema::new(SchemaType::String, "already-loaded skill instruction text"),
                ),
            Schema::new(SchemaType::Object, "skill response"),
        ),
        Arc::new(SkillHandler::new(skills)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn invoking_a_skill_makes_it_active() {
        let skills = Arc::new(SkillContext::new("s1"));
        let handler = SkillHandler::new(skills.clone());
        let ctx = ToolContext::new(".", "s1");
        let outcome = handler
            .handle(
                &ctx,
                &obj(json!({"action": "invoke", "name": "reviewer", "instructions": "be thorough"})),
            )
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(skills.active().await.map(|s| s.name), Some("reviewer".to_string()));
    }

    #[tokio::test]
    async fn clearing_removes_the_active_skill() {
        let skills = Arc::new(SkillContext::new("s1"));
        skills
            .invoke(SkillBundle {
                name: "reviewer".to_string(),
                instructions: "be thorough".to_string(),
            })
            .await;
        let handler = SkillHandler::new(skills.clone());
        let ctx = ToolContext::new(".", "s1");
        let outcome = handler.handle(&ctx, &obj(json!({"action": "clear"}))).await.unwrap();
        assert!(outcome.success);
        assert_eq!(skills.active().await, None);
    }

    #[tokio::test]
    async fn invoke_without_a_name_is_a_schema_error() {
        let skills = Arc::new(SkillContext::new("s1"));
        let handler = SkillHandler::new(skills);
        let ctx = ToolContext::new(".", "s1");
        let err = handler
            .handle(&ctx, &obj(json!({"action": "invoke"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
