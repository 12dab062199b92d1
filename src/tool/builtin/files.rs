//! The file family: read-file, write-file, list-files, find-files,
//! search-in-files.
//!
//! Path resolution, extension filtering, and the recursive directory walk
//! are adapted from `cloudllm::tools::filesystem::FileSystemTool`, routed
//! through [`crate::sandbox::PathSandbox`] instead of that tool's own
//! root-path check so every builtin tool shares one sandboxing
//! implementation. write-file additionally gates on a diff confirmation
//! (spec §4.4 table), which `FileSystemTool` has no equivalent for.

use crate::confirmation::ConfirmationProtocol;
use crate::schema::{FunctionDeclaration, Schema, SchemaType};
use crate::tool::{Tool, ToolContext, ToolError, ToolHandler, ToolOutcome};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

fn string_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing string field '{}'", key)))
}

fn object_schema(required: &[&str], props: Vec<(&str, Schema)>) -> Schema {
    let mut schema = Schema::new(SchemaType::Object, "arguments")
        .with_required(required.iter().map(|s| s.to_string()).collect());
    for (name, prop) in props {
        schema = schema.with_property(name, prop);
    }
    schema
}

// ---- read-file ----

pub struct ReadFileHandler;

#[async_trait]
impl ToolHandler for ReadFileHandler {
    async fn handle(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let path = string_arg(args, "path")?;
        let with_line_numbers = args.get("with_line_numbers").and_then(Value::as_bool).unwrap_or(false);

        let resolved = match ctx.sandbox().validate_path(path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutcome::failure(e.to_string())),
        };
        let content = match tokio::fs::read_to_string(&resolved).await {
            Ok(c) => c,
            Err(e) => return Ok(ToolOutcome::failure(format!("cannot read {}: {}", path, e))),
        };

        let rendered = if with_line_numbers {
            content
                .lines()
                .enumerate()
                .map(|(i, line)| format!("{:>5}\t{}", i + 1, line))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            content
        };

        let mut data = Map::new();
        data.insert("content".to_string(), Value::String(rendered));
        Ok(ToolOutcome::success(data))
    }
}

pub fn read_file_tool() -> Tool {
    Tool::new(
        FunctionDeclaration::new(
            "read-file",
            "Read a file's contents, optionally with line numbers",
            object_schema(
                &["path"],
                vec![
                    ("path", Schema::new(SchemaType::String, "file path")),
                    (
                        "with_line_numbers",
                        Schema::new(SchemaType::Boolean, "prefix each line with its number"),
                    ),
                ],
            ),
            Schema::new(SchemaType::Object, "read-file response"),
        ),
        Arc::new(ReadFileHandler),
    )
}

// ---- write-file ----

pub struct WriteFileHandler {
    confirmation: Option<Arc<ConfirmationProtocol>>,
}

impl WriteFileHandler {
    pub fn new(confirmation: Option<Arc<ConfirmationProtocol>>) -> Self {
        Self { confirmation }
    }
}

fn unified_diff(old: &str, new: &str, path: &str) -> String {
    // A minimal line-level diff: enough for a confirmation prompt, not a
    // general-purpose diff algorithm.
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let mut out = format!("--- {}\n+++ {}\n", path, path);
    for line in &old_lines {
        if !new_lines.contains(line) {
            out.push_str(&format!("-{}\n", line));
        }
    }
    for line in &new_lines {
        if !old_lines.contains(line) {
            out.push_str(&format!("+{}\n", line));
        }
    }
    out
}

#[async_trait]
impl ToolHandler for WriteFileHandler {
    async fn handle(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let path = string_arg(args, "path")?;
        let content = string_arg(args, "content")?;

        let resolved = match ctx.sandbox().validate_path(path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutcome::failure(e.to_string())),
        };

        if let Some(protocol) = &self.confirmation {
            let existing = tokio::fs::read_to_string(&resolved).await.unwrap_or_default();
            let diff = unified_diff(&existing, content, path);
            let confirmed = protocol
                .request(
                    ctx.session_id.clone(),
                    "Write file",
                    format!("Write changes to {}?", path),
                    Some(diff),
                    Some("diff".to_string()),
                    std::future::pending(),
                )
                .await
                .unwrap_or(false);
            if !confirmed {
                return Ok(ToolOutcome::failure(format!(
                    "write to {} cancelled by user",
                    path
                )));
            }
        }

        if let Some(parent) = resolved.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        match tokio::fs::write(&resolved, content).await {
            Ok(()) => {
                let mut data = Map::new();
                data.insert("path".to_string(), Value::String(path.to_string()));
                data.insert("bytes_written".to_string(), Value::from(content.len() as u64));
                Ok(ToolOutcome::success(data))
            }
            Err(e) => Ok(ToolOutcome::failure(format!("cannot write {}: {}", path, e))),
        }
    }
}

pub fn write_file_tool(confirmation: Option<Arc<ConfirmationProtocol>>) -> Tool {
    let requires_confirmation = confirmation.is_some();
    Tool::new(
        FunctionDeclaration::new(
            "write-file",
            "Create or replace a file after diff confirmation",
            object_schema(
                &["path", "content"],
                vec![
                    ("path", Schema::new(SchemaType::String, "file path")),
                    ("content", Schema::new(SchemaType::String, "new file content")),
                ],
            ),
            Schema::new(SchemaType::Object, "write-file response"),
        ),
        Arc::new(WriteFileHandler::new(confirmation)),
    )
    .with_confirmation_required(requires_confirmation)
}

// ---- list-files ----

pub struct ListFilesHandler;

fn is_gitignored(name: &str) -> bool {
    matches!(name, ".git" | "target" | "node_modules")
}

fn walk(dir: &std::path::Path, recursive: bool, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if is_gitignored(&name) {
            continue;
        }
        let path = entry.path();
        out.push(path.to_string_lossy().to_string());
        if recursive && path.is_dir() {
            walk(&path, recursive, out);
        }
    }
}

#[async_trait]
impl ToolHandler for ListFilesHandler {
    async fn handle(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let recursive = args.get("recursive").and_then(Value::as_bool).unwrap_or(true);

        let resolved = match ctx.sandbox().validate_path(path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutcome::failure(e.to_string())),
        };
        let mut entries = Vec::new();
        walk(&resolved, recursive, &mut entries);

        let mut data = Map::new();
        data.insert(
            "entries".to_string(),
            Value::Array(entries.into_iter().map(Value::String).collect()),
        );
        Ok(ToolOutcome::success(data))
    }
}

pub fn list_files_tool() -> Tool {
    Tool::new(
        FunctionDeclaration::new(
            "list-files",
            "Recursively list files under a directory, honoring gitignore-style excludes",
            object_schema(
                &[],
                vec![
                    ("path", Schema::new(SchemaType::String, "directory to list")),
                    ("recursive", Schema::new(SchemaType::Boolean, "descend into subdirectories")),
                ],
            ),
            Schema::new(SchemaType::Object, "list-files response"),
        ),
        Arc::new(ListFilesHandler),
    )
}

// ---- find-files ----

pub struct FindFilesHandler;

#[async_trait]
impl ToolHandler for FindFilesHandler {
    async fn handle(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let pattern = string_arg(args, "pattern")?;
        let path = args.get("path").and_then(Value::as_str).unwrap_or(".");

        let resolved = match ctx.sandbox().validate_path(path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutcome::failure(e.to_string())),
        };
        let mut entries = Vec::new();
        walk(&resolved, true, &mut entries);
        let matches: Vec<Value> = entries
            .into_iter()
            .filter(|e| e.contains(pattern))
            .map(Value::String)
            .collect();

        let mut data = Map::new();
        data.insert("matches".to_string(), Value::Array(matches));
        Ok(ToolOutcome::success(data))
    }
}

pub fn find_files_tool() -> Tool {
    Tool::new(
        FunctionDeclaration::new(
            "find-files",
            "Find files whose path contains a name pattern",
            object_schema(
                &["pattern"],
                vec![
                    ("pattern", Schema::new(SchemaType::String, "substring to match against each path")),
                    ("path", Schema::new(SchemaType::String, "directory to search under")),
                ],
            ),
            Schema::new(SchemaType::Object, "find-files response"),
        ),
        Arc::new(FindFilesHandler),
    )
}

// ---- search-in-files ----

pub struct SearchInFilesHandler;

#[async_trait]
impl ToolHandler for SearchInFilesHandler {
    async fn handle(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let needle = string_arg(args, "query")?;
        let path = args.get("path").and_then(Value::as_str).unwrap_or(".");

        let resolved = match ctx.sandbox().validate_path(path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutcome::failure(e.to_string())),
        };
        let mut files = Vec::new();
        walk(&resolved, true, &mut files);

        let mut hits = Vec::new();
        for file in files {
            let file_path = std::path::Path::new(&file);
            if file_path.is_dir() {
                continue;
            }
            let Ok(content) = tokio::fs::read_to_string(file_path).await else {
                continue;
            };
            for (lineno, line) in content.lines().enumerate() {
                if line.contains(needle) {
                    hits.push(serde_json::json!({
                        "path": file,
                        "line": lineno + 1,
                        "text": line,
                    }));
                }
            }
        }

        let mut data = Map::new();
        data.insert("matches".to_string(), Value::Array(hits));
        Ok(ToolOutcome::success(data))
    }
}

pub fn search_in_files_tool() -> Tool {
    Tool::new(
        FunctionDeclaration::new(
            "search-in-files",
            "Search file contents for a literal substring",
            object_schema(
                &["query"],
                vec![
                    ("query", Schema::new(SchemaType::String, "text to search for")),
                    ("path", Schema::new(SchemaType::String, "directory to search under")),
                ],
            ),
            Schema::new(SchemaType::Object, "search-in-files response"),
        ),
        Arc::new(SearchInFilesHandler),
    )
}
