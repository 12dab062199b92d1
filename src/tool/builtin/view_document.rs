//! `view-document`: load a PDF off disk and return it base64-encoded for LLM
//! inspection.
//!
//! No teacher file owns a document tool and the pack carries no PDF-parsing
//! crate for any repo, so this stays a thin pass-through (read bytes, sniff
//! the `%PDF` magic, base64-encode) rather than fabricating a PDF-parsing
//! dependency — the model consumes the raw bytes itself.

use crate::schema::{FunctionDeclaration, Schema, SchemaType};
use crate::tool::{Tool, ToolContext, ToolError, ToolHandler, ToolOutcome};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{Map, Value};
use std::sync::Arc;

const DEFAULT_MAX_BYTES: usize = 32 * 1024 * 1024;
const PDF_MAGIC: &[u8] = b"%PDF";

pub struct ViewDocumentHandler {
    max_bytes: usize,
}

impl ViewDocumentHandler {
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

impl Default for ViewDocumentHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for ViewDocumentHandler {
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

        if !bytes.starts_with(PDF_MAGIC) {
            return Ok(ToolOutcome::failure(format!("{} does not look like a PDF", path)));
        }

        if bytes.len() > self.max_bytes {
            return Ok(ToolOutcome::failure(format!(
                "document is {} bytes, exceeding the {} byte limit",
                bytes.len(),
                self.max_bytes
            )));
        }

        let mut data = Map::new();
        data.insert(
            "base64".to_string(),
            Value::String(base64::engine::general_purpose::STANDARD.encode(&bytes)),
        );
        data.insert("mime_type".to_string(), Value::String("application/pdf".to_string()));
        data.insert("byte_size".to_string(), Value::from(bytes.len() as u64));
        Ok(ToolOutcome::success(data))
    }
}

pub fn view_document_tool(handler: ViewDocumentHandler) -> Tool {
    Tool::new(
        FunctionDeclaration::new(
            "view-document",
            "Load a PDF and return it base64-encoded for inspection",
            Schema::new(SchemaType::Object, "view-document arguments")
                .with_required(vec!["path".to_string()])
                .with_property("path", Schema::new(SchemaType::String, "path to the PDF file")),
            Schema::new(SchemaType::Object, "view-document response"),
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
    async fn reads_and_encodes_a_pdf() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("doc.pdf");
        tokio::fs::write(&file_path, b"%PDF-1.4 rest of file").await.unwrap();

        let handler = ViewDocumentHandler::new();
        let ctx = ToolContext::new(dir.path(), "s1");
        let outcome = handler.handle(&ctx, &args("doc.pdf")).await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.data.get("mime_type").and_then(Value::as_str),
            Some("application/pdf")
        );
    }

    #[tokio::test]
    async fn non_pdf_content_is_rejected_as_a_failure() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("notes.txt");
        tokio::fs::write(&file_path, b"just text").await.unwrap();

        let handler = ViewDocumentHandler::new();
        let ctx = ToolContext::new(dir.path(), "s1");
        let outcome = handler.handle(&ctx, &args("notes.txt")).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("does not look like a PDF"));
    }
}
