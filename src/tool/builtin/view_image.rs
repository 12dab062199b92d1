//! `view-image`: load a raster image off disk and return it base64-encoded
//! for LLM multimodal inspection.
//!
//! No teacher file owns an image tool; the path-resolution-through-the-
//! sandbox and `ToolOutcome` shape follow `files.rs`. Re-encoding (actually
//! resizing oversized images) needs an image-processing crate the pack
//! doesn't carry for any repo's image tooling, so this handler instead
//! enforces a byte-size ceiling and reports failure above it rather than
//! silently shipping a multi-megabyte payload to the model.

use crate::schema::{FunctionDeclaration, Schema, SchemaType};
use crate::tool::{Tool, ToolContext, ToolError, ToolHandler, ToolOutcome};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{Map, Value};
use std::sync::Arc;

const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

fn mime_for_extension(path: &str) -> &'static str {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

pub struct ViewImageHandler {
    max_bytes: usize,
}

impl ViewImageHandler {
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl Default for ViewImageHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for ViewImageHandler {
    async fn handle(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let Some(path) = args.get("path").and_then(Value::as_str) else {
            return Err(ToolError::InvalidParameters("missing string field 'path'".to_string()));
        };

        let resolved = match ctx.sandbox().validate_path(path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutcome::failure(e.to_string())),
        };

        let bytes = match tokio::fs::read(&resolved).await {
            Ok(b) => b,
            Err(e) => return Ok(ToolOutcome::failure(format!("cannot read {}: {}", path, e))),
        };

        if bytes.len() > self.max_bytes {
            return Ok(ToolOutcome::failure(format!(
                "image is {} bytes, exceeding the {} byte limit; re-encode it smaller before retrying",
                bytes.len(),
                self.max_bytes
            )));
        }

        let mut data = Map::new();
        data.insert(
            "base64".to_string(),
            Value::String(base64::engine::general_purpose::STANDARD.encode(&bytes)),
        );
        data.insert("mime_type".to_string(), Value::String(mime_for_extension(path).to_string()));
        data.insert("byte_size".to_string(), Value::from(bytes.len() as u64));
        Ok(ToolOutcome::success(data))
    }
}

pub fn view_image_tool(handler: ViewImageHandler) -> Tool {
    Tool::new(
        FunctionDeclaration::new(
            "view-image",
            "Load a raster image and return it base64-encoded for visual inspection",
            Schema::new(SchemaType::Object, "view-image arguments")
                .with_required(vec!["path".to_string()])
                .with_property("path", Schema::new(SchemaType::String, "path to the image file")),
            Schema::new(SchemaType::Object, "view-image response"),
        ),
        Arc::new(handler),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args(path: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("path".to_string(), Value::String(path.to_string()));
        m
    }

    #[tokio::test]
    async fn reads_and_base64_encodes_a_small_image() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("pixel.png");
        tokio::fs::write(&file_path, [0x89, 0x50, 0x4e, 0x47]).await.unwrap();

        let handler = ViewImageHandler::new();
        let ctx = ToolContext::new(dir.path(), "s1");
        let outcome = handler.handle(&ctx, &args("pixel.png")).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.data.get("mime_type").and_then(Value::as_str), Some("image/png"));
        assert_eq!(
            outcome.data.get("base64").and_then(Value::as_str),
            Some("iVBORw==")
        );
    }

    #[tokio::test]
    async fn oversized_image_is_a_reported_failure_not_an_error() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("big.png");
        tokio::fs::write(&file_path, vec![0u8; 32]).await.unwrap();

        let handler = ViewImageHandler::new().with_max_bytes(16);
        let ctx = ToolContext::new(dir.path(), "s1");
        let outcome = handler.handle(&ctx, &args("big.png")).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("exceeding"));
    }

    #[tokio::test]
    async fn path_escaping_the_sandbox_is_rejected() {
        let dir = tempdir().unwrap();
        let handler = ViewImageHandler::new();
        let ctx = ToolContext::new(dir.path(), "s1");
        let outcome = handler.handle(&ctx, &args("../outside.png")).await.unwrap();
        assert!(!outcome.success);
    }
}
