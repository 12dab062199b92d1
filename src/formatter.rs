//! Output formatter: parses tool-output envelopes out of LLM text.
//!
//! The fenced-JSON-block convention is the one the teacher's own doc
//! comments use for structured examples; the parsing algorithm itself is new
//! code directly off spec §4.7 — there's no teacher module that does this
//! particular job.

use serde_json::Value;

const FENCE_LANG: &str = "tool_outputs";

/// Parse and strip `tool_outputs` fenced blocks from `text`, replacing them
/// with a short status-line summary.
///
/// Each fenced block's body must be a JSON object whose keys end in
/// `_response` and whose values are objects with at least a `success: bool`
/// field; for each entry a line `<toolName> - Success|Failure` is produced
/// (tool name derived by stripping the `_response` suffix). Blocks that fail
/// to parse are dropped silently, matching the "parsing" error category in
/// spec §7 (malformed envelopes are not fatal).
///
/// Status lines are prepended to the remaining prose (joined by a blank
/// line), triple-or-more blank lines collapse to double, and the result is
/// trimmed. If the cleaned-up text is empty but at least one block was
/// successfully processed, the literal `"I've processed your request."` is
/// returned instead of an empty string.
pub fn format_output(text: &str) -> String {
    let (remaining, status_lines, processed_any) = extract_blocks(text);

    let cleaned = collapse_blank_lines(remaining.trim());

    let combined = match (status_lines.is_empty(), cleaned.is_empty()) {
        (true, _) => cleaned,
        (false, true) => status_lines.join("\n"),
        (false, false) => format!("{}\n\n{}", status_lines.join("\n"), cleaned),
    };

    if combined.trim().is_empty() && processed_any {
        "I've processed your request.".to_string()
    } else {
        combined
    }
}

/// Strip every fenced ```tool_outputs block from `text`, returning the
/// remaining text, the status lines collected from blocks that parsed
/// successfully, and whether at least one block was successfully parsed
/// (even if it produced zero status lines).
fn extract_blocks(text: &str) -> (String, Vec<String>, bool) {
    let fence_open = format!("```{}", FENCE_LANG);
    let mut remaining = String::new();
    let mut status_lines = Vec::new();
    let mut processed_any = false;
    let mut rest = text;

    while let Some(start) = rest.find(&fence_open) {
        remaining.push_str(&rest[..start]);
        let after_open = &rest[start + fence_open.len()..];
        match after_open.find("```") {
            Some(end) => {
                let body = &after_open[..end];
                if let Some(lines) = parse_block(body) {
                    processed_any = true;
                    status_lines.extend(lines);
                }
                rest = &after_open[end + 3..];
            }
            None => {
                // Unterminated fence: treat the rest as ordinary text rather
                // than silently discarding it.
                remaining.push_str(&fence_open);
                rest = after_open;
                break;
            }
        }
    }
    remaining.push_str(rest);
    (remaining, status_lines, processed_any)
}

fn parse_block(body: &str) -> Option<Vec<String>> {
    let parsed: Value = serde_json::from_str(body.trim()).ok()?;
    let object = parsed.as_object()?;
    let mut lines = Vec::new();
    for (key, value) in object {
        let tool_name = key.strip_suffix("_response").unwrap_or(key);
        let success = value.get("success")?.as_bool()?;
        lines.push(format!(
            "{} - {}",
            tool_name,
            if success { "Success" } else { "Failure" }
        ));
    }
    Some(lines)
}

fn collapse_blank_lines(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.split('\n') {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run <= 2 {
                collapsed.push('\n');
            }
        } else {
            blank_run = 0;
            if !collapsed.is_empty() {
                collapsed.push('\n');
            }
            collapsed.push_str(line);
        }
    }
    collapsed.trim_end_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_block_and_prepends_status_line() {
        let text = "Here's what I did.\n```tool_outputs\n{\"read_file_response\": {\"success\": true}}\n```\nAll done.";
        let out = format_output(text);
        assert!(out.starts_with("read_file - Success"));
        assert!(out.contains("Here's what I did."));
        assert!(out.contains("All done."));
        assert!(!out.contains("```"));
    }

    #[test]
    fn reports_failure_entries() {
        let text = "```tool_outputs\n{\"write_file_response\": {\"success\": false}}\n```";
        let out = format_output(text);
        assert_eq!(out, "write_file - Failure");
    }

    #[test]
    fn malformed_block_is_dropped_silently() {
        let text = "before\n```tool_outputs\nnot json\n```\nafter";
        let out = format_output(text);
        assert!(!out.contains("tool_outputs"));
        assert!(out.contains("before"));
        assert!(out.contains("after"));
    }

    #[test]
    fn single_success_entry_produces_just_its_status_line() {
        let text = "```tool_outputs\n{\"x_response\": {\"success\": true}}\n```";
        let out = format_output(text);
        assert_eq!(out, "x - Success");
    }

    #[test]
    fn block_with_no_entries_but_no_prose_returns_placeholder() {
        let text = "```tool_outputs\n{}\n```";
        let out = format_output(text);
        assert_eq!(out, "I've processed your request.");
    }

    #[test]
    fn no_blocks_at_all_just_cleans_whitespace() {
        let text = "  hello world  \n\n\n\nbye  ";
        let out = format_output(text);
        assert_eq!(out, "hello world\n\nbye");
    }
}
