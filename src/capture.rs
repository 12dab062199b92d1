//! Interaction capture: thread-safe, append-only record/replay of LLM calls.
//!
//! Grounded on the teacher's append-only persistence idiom
//! (`thought_chain.rs`) and its defensive-copy-on-read convention
//! (`tool_protocol.rs`), bounded to an in-memory ring rather than an
//! on-disk hash chain — durable persistence across restarts is a non-goal
//! here, the JSON snapshot is a convenience, not a guarantee.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// A single captured LLM call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    /// Timestamp-nanosecond unique identifier.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub prompt_name: String,
    pub prompt_text: String,
    pub prompt_instruction: String,
    pub function_names: Vec<String>,
    pub args: std::collections::HashMap<String, String>,
    pub response_text: Option<String>,
    pub error: Option<InteractionError>,
    pub duration_nanos: u128,
    pub provider: String,
    pub tool_names: Vec<String>,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionError {
    pub message: String,
    pub type_name: String,
}

/// A handle to an interaction still in flight, returned by `start`.
pub struct InFlight {
    pub id: String,
    started_at: std::time::Instant,
    prompt_name: String,
    prompt_text: String,
    prompt_instruction: String,
    function_names: Vec<String>,
    args: std::collections::HashMap<String, String>,
    provider: String,
    tool_names: Vec<String>,
    debug: bool,
}

/// Thread-safe record keeper bounded by `max_size` with FIFO (LRU) eviction.
pub struct InteractionCapture {
    records: Mutex<Vec<Interaction>>,
    max_size: usize,
    auto_save_path: Option<std::path::PathBuf>,
}

impl InteractionCapture {
    pub fn new(max_size: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            max_size,
            auto_save_path: None,
        }
    }

    pub fn with_auto_save(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.auto_save_path = Some(path.into());
        self
    }

    /// Begin recording an interaction. The returned [`InFlight`] handle is
    /// completed with [`InteractionCapture::complete`].
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &self,
        prompt_name: impl Into<String>,
        prompt_text: impl Into<String>,
        prompt_instruction: impl Into<String>,
        function_names: Vec<String>,
        args: std::collections::HashMap<String, String>,
        provider: impl Into<String>,
        tool_names: Vec<String>,
        debug: bool,
    ) -> InFlight {
        let now = Utc::now();
        InFlight {
            id: format!("{}", now.timestamp_nanos_opt().unwrap_or_default()),
            started_at: std::time::Instant::now(),
            prompt_name: prompt_name.into(),
            prompt_text: prompt_text.into(),
            prompt_instruction: prompt_instruction.into(),
            function_names,
            args,
            provider: provider.into(),
            tool_names,
            debug,
        }
    }

    /// Finish recording: append the completed interaction, trim to
    /// `max_size` (evicting the oldest), and auto-save if configured.
    pub fn complete(
        &self,
        in_flight: InFlight,
        response_text: Option<String>,
        error: Option<InteractionError>,
    ) {
        let interaction = Interaction {
            id: in_flight.id,
            timestamp: Utc::now(),
            prompt_name: in_flight.prompt_name,
            prompt_text: in_flight.prompt_text,
            prompt_instruction: in_flight.prompt_instruction,
            function_names: in_flight.function_names,
            args: in_flight.args,
            response_text,
            error,
            duration_nanos: in_flight.started_at.elapsed().as_nanos(),
            provider: in_flight.provider,
            tool_names: in_flight.tool_names,
            debug: in_flight.debug,
        };
        let mut records = self.records.lock().unwrap();
        records.push(interaction);
        if records.len() > self.max_size {
            let overflow = records.len() - self.max_size;
            records.drain(0..overflow);
        }
        drop(records);
        if let Some(path) = &self.auto_save_path {
            if let Err(e) = self.save_to_file(path) {
                log::warn!("capture auto-save to {:?} failed: {}", path, e);
            }
        }
    }

    /// Defensive copy of every retained interaction, oldest first.
    pub fn interactions(&self) -> Vec<Interaction> {
        self.records.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }

    pub fn summary(&self) -> CaptureSummary {
        let records = self.records.lock().unwrap();
        CaptureSummary {
            total: records.len(),
            errors: records.iter().filter(|r| r.error.is_some()).count(),
        }
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let records = self.records.lock().unwrap();
        let json = serde_json::to_string_pretty(&*records)?;
        std::fs::write(path, json)
    }

    pub fn load_from_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = std::fs::read_to_string(path)?;
        let loaded: Vec<Interaction> = serde_json::from_str(&content)?;
        *self.records.lock().unwrap() = loaded;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSummary {
    pub total: usize,
    pub errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_oldest_beyond_max_size() {
        let capture = InteractionCapture::new(2);
        for i in 0..3 {
            let flight = capture.start(
                format!("p{}", i),
                "text",
                "instr",
                vec![],
                Default::default(),
                "mock",
                vec![],
                false,
            );
            capture.complete(flight, Some("ok".to_string()), None);
        }
        let interactions = capture.interactions();
        assert_eq!(interactions.len(), 2);
        assert_eq!(interactions[0].prompt_name, "p1");
        assert_eq!(interactions[1].prompt_name, "p2");
    }

    #[test]
    fn save_then_load_round_trips_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");
        let capture = InteractionCapture::new(10);
        let flight = capture.start(
            "p",
            "text",
            "instr",
            vec!["search".to_string()],
            Default::default(),
            "mock",
            vec![],
            false,
        );
        capture.complete(flight, Some("response".to_string()), None);
        capture.save_to_file(&path).unwrap();

        let reloaded = InteractionCapture::new(10);
        reloaded.load_from_file(&path).unwrap();
        assert_eq!(reloaded.interactions(), capture.interactions());
    }

    #[test]
    fn summary_counts_errors_separately() {
        let capture = InteractionCapture::new(10);
        let flight = capture.start(
            "p",
            "t",
            "i",
            vec![],
            Default::default(),
            "mock",
            vec![],
            false,
        );
        capture.complete(
            flight,
            None,
            Some(InteractionError {
                message: "boom".to_string(),
                type_name: "TransportError".to_string(),
            }),
        );
        let summary = capture.summary();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.errors, 1);
    }
}
