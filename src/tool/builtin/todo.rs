//! `todo-write`: replace the session's structured task list.
//!
//! Thin adapter over [`crate::todo::TodoManager`] in the same
//! handler-parses-JSON-then-delegates shape as the file family; the
//! wholesale-replace-or-reject-entirely semantics live in `TodoManager`
//! itself, not here.

use crate::schema::{FunctionDeclaration, Schema, SchemaType};
use crate::todo::{TodoItem, TodoManager, TodoPriority, TodoStatus};
use crate::tool::{Tool, ToolContext, ToolError, ToolHandler, ToolOutcome};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct TodoWriteHandler {
    manager: Arc<TodoManager>,
}

impl TodoWriteHandler {
    pub fn new(manager: Arc<TodoManager>) -> Self {
        Self { manager }
    }
}

fn parse_item(value: &Value) -> Result<TodoItem, String> {
    let obj = value.as_object().ok_or("each todo must be an object")?;
    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .ok_or("missing string field 'id'")?
        .to_string();
    let content = obj
        .get("content")
        .and_then(Value::as_str)
        .ok_or("missing string field 'content'")?
        .to_string();
    let status = obj
        .get("status")
        .and_then(Value::as_str)
        .ok_or("missing string field 'status'")?
        .parse::<TodoStatus>()
        .map_err(|e| e.to_string())?;
    let priority = obj
        .get("priority")
        .and_then(Value::as_str)
        .ok_or("missing string field 'priority'")?
        .parse::<TodoPriority>()
        .map_err(|e| e.to_string())?;
    Ok(TodoItem {
        id,
        content,
        status,
        priority,
    })
}

#[async_trait]
impl ToolHandler for TodoWriteHandler {
    async fn handle(&self, _ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let Some(items_value) = args.get("items").and_then(Value::as_array) else {
            return Err(ToolError::InvalidParameters("missing array field 'items'".to_string()));
        };

        let mut items = Vec::with_capacity(items_value.len());
        for raw in items_value {
            match parse_item(raw) {
                Ok(item) => items.push(item),
                Err(e) => return Ok(ToolOutcome::failure(e)),
            }
        }

        let count = items.len();
        match self.manager.replace(items) {
            Ok(()) => {
                let mut data = Map::new();
                data.insert("count".to_string(), Value::from(count as u64));
                Ok(ToolOutcome::success(data))
            }
            Err(e) => Ok(ToolOutcome::failure(e.to_string())),
        }
    }
}

pub fn todo_write_tool(manager: Arc<TodoManager>) -> Tool {
    Tool::new(
        FunctionDeclaration::new(
            "todo-write",
            "Replace the session's structured task list",
            Schema::new(SchemaType::Object, "todo-write arguments")
                .with_required(vec!["items".to_string()])
                .with_property(
                    "items",
                    Schema::new(SchemaType::Array, "the full replacement task list").with_items(Schema::new(
                        SchemaType::Object,
                        "a single todo item (id, content, status, priority)",
                    )),
                ),
            Schema::new(SchemaType::Object, "todo-write response"),
        ),
        Arc::new(TodoWriteHandler::new(manager)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args_with(items: Value) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("items".to_string(), items);
        m
    }

    #[tokio::test]
    async fn replaces_the_task_list_and_reports_the_count() {
        let manager = Arc::new(TodoManager::new());
        let handler = TodoWriteHandler::new(manager.clone());
        let ctx = ToolContext::new(".", "s1");
        let outcome = handler
            .handle(
                &ctx,
                &args_with(json!([
                    {"id": "1", "content": "write tests", "status": "pending", "priority": "high"}
                ])),
            )
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.data.get("count").and_then(Value::as_u64), Some(1));
        assert_eq!(manager.items().len(), 1);
    }

    #[tokio::test]
    async fn invalid_status_is_reported_as_a_failure_not_an_error() {
        let manager = Arc::new(TodoManager::new());
        let handler = TodoWriteHandler::new(manager.clone());
        let ctx = ToolContext::new(".", "s1");
        let outcome = handler
            .handle(
                &ctx,
                &args_with(json!([
                    {"id": "1", "content": "x", "status": "bogus", "priority": "low"}
                ])),
            )
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(manager.items().is_empty());
    }

    #[tokio::test]
    async fn missing_items_field_is_a_schema_error() {
        let manager = Arc::new(TodoManager::new());
        let handler = TodoWriteHandler::new(manager);
        let ctx = ToolContext::new(".", "s1");
        let err = handler.handle(&ctx, &Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
