//! Runtime configuration.
//!
//! A single plain struct with a [`Default`] impl, in the same spirit as the
//! teacher's own configuration surface: no TOML/YAML/config-file parsing
//! dependency is introduced here. Callers that want file-backed configuration
//! can deserialize a `RuntimeConfig` with `serde` themselves; this crate only
//! owns the shape and the defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables consumed by the gateway, chain engine, and confirmation protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Where the capture middleware auto-saves interaction snapshots, if enabled.
    pub capture_file: Option<PathBuf>,
    /// Maximum number of interactions retained by the capture ring buffer.
    pub capture_max_size: usize,
    /// Default retry attempts for the retry gateway middleware.
    pub retry_max_attempts: u32,
    /// Initial backoff delay; subsequent delays are `initial * 2^i`.
    #[serde(with = "duration_secs")]
    pub retry_initial_delay: Duration,
    /// Default ceiling on tool-calling round-trips per generate call.
    pub max_tool_calls: u32,
    /// Model used for the chain engine's synthetic decision-step prompt.
    pub decision_model: String,
    /// Temperature for the decision-step synthetic prompt. Spec leaves this a
    /// hard-coded 0.1; this crate exposes it as a configurable default.
    pub decision_temperature: f32,
    /// Token cap for the decision-step synthetic prompt (spec default 1000).
    pub decision_max_tokens: u32,
    /// How long a confirmation request waits before timing out.
    #[serde(with = "duration_secs")]
    pub confirmation_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            capture_file: None,
            capture_max_size: 1000,
            retry_max_attempts: 3,
            retry_initial_delay: Duration::from_millis(500),
            max_tool_calls: 3,
            decision_model: "default".to_string(),
            decision_temperature: 0.1,
            decision_max_tokens: 1000,
            confirmation_timeout: Duration::from_secs(300),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.max_tool_calls, 3);
        assert_eq!(cfg.capture_max_size, 1000);
        assert_eq!(cfg.decision_temperature, 0.1);
        assert_eq!(cfg.decision_max_tokens, 1000);
        assert_eq!(cfg.confirmation_timeout, Duration::from_secs(300));
    }

    #[test]
    fn serializes_round_trip() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.retry_max_attempts, cfg.retry_max_attempts);
    }
}
