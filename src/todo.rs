//! Todo manager: the structured task list backing the `todo-write` tool.
//!
//! No teacher file owns a task list directly; the thread-safe,
//! `Arc<Mutex<...>>`-guarded shared-state shape is grounded on
//! `cloudllm::tools::memory::Memory`'s key-value store — here the "value" is
//! always the same `Vec<TodoItem>`, replaced wholesale on every write rather
//! than keyed by caller-chosen names.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    pub priority: TodoPriority,
}

/// Configuration-category errors (spec §7): invalid status/priority, or a
/// duplicate id within the same replacement list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoError {
    InvalidStatus(String),
    InvalidPriority(String),
    DuplicateId(String),
}

impl std::fmt::Display for TodoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TodoError::InvalidStatus(s) => write!(f, "invalid todo status: {:?}", s),
            TodoError::InvalidPriority(s) => write!(f, "invalid todo priority: {:?}", s),
            TodoError::DuplicateId(id) => write!(f, "duplicate todo id: {:?}", id),
        }
    }
}

impl std::error::Error for TodoError {}

impl std::str::FromStr for TodoStatus {
    type Err = TodoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TodoStatus::Pending),
            "in_progress" => Ok(TodoStatus::InProgress),
            "completed" => Ok(TodoStatus::Completed),
            other => Err(TodoError::InvalidStatus(other.to_string())),
        }
    }
}

impl std::str::FromStr for TodoPriority {
    type Err = TodoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TodoPriority::Low),
            "medium" => Ok(TodoPriority::Medium),
            "high" => Ok(TodoPriority::High),
            other => Err(TodoError::InvalidPriority(other.to_string())),
        }
    }
}

/// A session's structured task list, replaced wholesale by `todo-write`
/// rather than mutated item-by-item.
#[derive(Default)]
pub struct TodoManager {
    items: Mutex<Vec<TodoItem>>,
}

impl TodoManager {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Replace the entire list. Rejects duplicate ids within the new list
    /// up front, leaving the previous list untouched on failure.
    pub fn replace(&self, items: Vec<TodoItem>) -> Result<(), TodoError> {
        let mut seen = std::collections::HashSet::new();
        for item in &items {
            if !seen.insert(item.id.clone()) {
                return Err(TodoError::DuplicateId(item.id.clone()));
            }
        }
        *self.items.lock().unwrap() = items;
        Ok(())
    }

    pub fn items(&self) -> Vec<TodoItem> {
        self.items.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.items.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, status: TodoStatus) -> TodoItem {
        TodoItem {
            id: id.to_string(),
            content: "do the thing".to_string(),
            status,
            priority: TodoPriority::Medium,
        }
    }

    #[test]
    fn replace_is_wholesale_not_a_merge() {
        let manager = TodoManager::new();
        manager.replace(vec![item("a", TodoStatus::Pending)]).unwrap();
        manager.replace(vec![item("b", TodoStatus::InProgress)]).unwrap();
        let items = manager.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "b");
    }

    #[test]
    fn duplicate_ids_in_the_same_replacement_are_rejected() {
        let manager = TodoManager::new();
        let err = manager
            .replace(vec![item("a", TodoStatus::Pending), item("a", TodoStatus::Completed)])
            .unwrap_err();
        assert_eq!(err, TodoError::DuplicateId("a".to_string()));
        assert!(manager.items().is_empty());
    }

    #[test]
    fn status_and_priority_parse_from_their_wire_strings() {
        assert_eq!("pending".parse::<TodoStatus>().unwrap(), TodoStatus::Pending);
        assert_eq!("high".parse::<TodoPriority>().unwrap(), TodoPriority::High);
        assert!("bogus".parse::<TodoStatus>().is_err());
    }
}
