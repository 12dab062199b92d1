//! `{{.key}}` string and file templating over a flat string context.
//!
//! No teacher file owns a template engine directly; the `{{.key}}`
//! convention is referenced throughout the teacher's own doc examples, so
//! this module is new code written in the teacher's plain-function style
//! rather than adapted from an existing one.

use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    Io(String),
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::Io(msg) => write!(f, "template I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TemplateError {}

/// Render `text` by substituting every `{{.key}}` occurrence with the
/// corresponding value from `context`. Keys absent from `context` are left
/// untouched (rendering never fails on a missing key — callers enforce
/// required-key preconditions upstream, per the chain engine's `Requires`
/// check).
///
/// Rendering is pure and idempotent: re-rendering an already-rendered string
/// against the same context is a no-op, because there are no more `{{.key}}`
/// markers left to substitute.
pub fn render(text: &str, context: &HashMap<String, String>) -> String {
    let mut output = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' && text[i..].starts_with("{{.") {
            if let Some(end) = text[i..].find("}}") {
                let key = &text[i + 3..i + end];
                if let Some(value) = context.get(key) {
                    output.push_str(value);
                    i += end + 2;
                    continue;
                }
            }
        }
        let ch = text[i..].chars().next().unwrap();
        output.push(ch);
        i += ch.len_utf8();
    }
    output
}

/// Convert a literal `<%...%>` marker in `text` to `{{...}}`, so prompts that
/// teach the LLM how to write templates can display template syntax to the
/// model without it being substituted by [`render`] on the way in.
///
/// This is meant to run as a secondary pass over a prompt's `Instruction`
/// *before* [`render`], per the gateway's rendering contract.
pub fn unescape_markers(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<%") {
        output.push_str(&rest[..start]);
        rest = &rest[start + 2..];
        if let Some(end) = rest.find("%>") {
            output.push_str("{{");
            output.push_str(&rest[..end]);
            output.push_str("}}");
            rest = &rest[end + 2..];
        } else {
            output.push_str("<%");
            break;
        }
    }
    output.push_str(rest);
    output
}

/// Render a template file on disk against `context`.
pub fn render_file(
    path: impl AsRef<Path>,
    context: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let raw = std::fs::read_to_string(path).map_err(|e| TemplateError::Io(e.to_string()))?;
    Ok(render(&raw, context))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_keys() {
        let out = render("Hello {{.name}}!", &ctx(&[("name", "world")]));
        assert_eq!(out, "Hello world!");
    }

    #[test]
    fn leaves_unknown_keys_untouched() {
        let out = render("Hello {{.missing}}!", &ctx(&[]));
        assert_eq!(out, "Hello {{.missing}}!");
    }

    #[test]
    fn rendering_is_idempotent() {
        let context = ctx(&[("name", "world")]);
        let once = render("Hello {{.name}}!", &context);
        let twice = render(&once, &context);
        assert_eq!(once, twice);
    }

    #[test]
    fn unescape_markers_converts_angle_percent_to_double_brace() {
        let out = unescape_markers("Use <%.key%> to substitute.");
        assert_eq!(out, "Use {{.key}} to substitute.");
    }

    #[test]
    fn unescaped_markers_then_render_substitutes_the_revealed_key() {
        let instruction = unescape_markers("Example: <%.name%>");
        let rendered = render(&instruction, &ctx(&[("name", "Ada")]));
        assert_eq!(rendered, "Example: Ada");
    }
}
