//! Configuration for the engine, driver, uplink protocol and simulated radio.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// What `begin` does when a differently named child is requested while the
/// existing child is still unfinished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildPolicy {
    /// Drop the unfinished subtree and start the new child (logged as a warning)
    #[default]
    Discard,
    /// Refuse with `EngineError::ChildBusy`
    Reject,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of live frames (chain depth plus nothing else)
    pub max_frames: usize,

    /// Behaviour when a different child replaces an unfinished one
    pub child_policy: ChildPolicy,

    /// Emit frame lifecycle events through `tracing`
    pub trace_frames: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_frames: 16,
            child_policy: ChildPolicy::Discard,
            trace_frames: false,
        }
    }
}

impl EngineConfig {
    /// Config that turns silent child replacement into an error
    pub fn strict() -> Self {
        Self {
            child_policy: ChildPolicy::Reject,
            ..Default::default()
        }
    }

    /// Builder: set the frame limit
    pub fn max_frames(mut self, frames: usize) -> Self {
        self.max_frames = frames;
        self
    }

    /// Builder: set the child replacement policy
    pub fn child_policy(mut self, policy: ChildPolicy) -> Self {
        self.child_policy = policy;
        self
    }

    /// Builder: enable frame tracing
    pub fn trace_frames(mut self, enable: bool) -> Self {
        self.trace_frames = enable;
        self
    }
}

/// Polling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Give up after this many ticks (0 = unlimited)
    pub max_ticks: u64,

    /// Pause between ticks when no delay was requested, in milliseconds
    pub min_tick_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_ticks: 10_000,
            min_tick_ms: 10,
        }
    }
}

impl DriverConfig {
    /// Minimum pause between ticks
    pub fn min_tick(&self) -> Duration {
        Duration::from_millis(self.min_tick_ms)
    }

    /// Builder: set the tick limit
    pub fn max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = ticks;
        self
    }

    /// Builder: set the minimum tick pause
    pub fn min_tick_ms(mut self, ms: u64) -> Self {
        self.min_tick_ms = ms;
        self
    }
}

/// Uplink protocol timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    /// Radio warm-up after power on, in milliseconds
    pub warmup_ms: u64,

    /// Delay between downlink polls, in milliseconds
    pub poll_interval_ms: u64,

    /// How long to wait for a downlink, in milliseconds
    pub downlink_timeout_ms: u64,

    /// Fail the uplink when no downlink arrives in time
    pub downlink_required: bool,

    /// Send attempts before the transmit step fails
    pub max_send_attempts: u8,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            warmup_ms: 500,
            poll_interval_ms: 1_000,
            downlink_timeout_ms: 30_000,
            downlink_required: true,
            max_send_attempts: 3,
        }
    }
}

impl UplinkConfig {
    /// Uplink that does not wait for any downlink
    pub fn fire_and_forget() -> Self {
        Self {
            downlink_required: false,
            downlink_timeout_ms: 0,
            ..Default::default()
        }
    }

    /// Builder: set the downlink timeout
    pub fn downlink_timeout_ms(mut self, ms: u64) -> Self {
        self.downlink_timeout_ms = ms;
        self
    }

    /// Builder: require a downlink
    pub fn downlink_required(mut self, required: bool) -> Self {
        self.downlink_required = required;
        self
    }

    /// Builder: set the send attempts
    pub fn max_send_attempts(mut self, attempts: u8) -> Self {
        self.max_send_attempts = attempts.max(1);
        self
    }
}

/// Simulated transceiver behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Probability that a poll yields a downlink (0.0 - 1.0)
    pub downlink_probability: f64,

    /// Probability that a send fails (0.0 - 1.0)
    pub send_failure_rate: f64,

    /// Downlink payload handed back by the simulated network
    pub downlink_payload: String,

    /// Seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            downlink_probability: 0.3,
            send_failure_rate: 0.0,
            downlink_payload: "ack".to_string(),
            seed: None,
        }
    }
}

impl RadioConfig {
    /// Radio whose every poll returns a downlink and every send succeeds
    pub fn perfect() -> Self {
        Self {
            downlink_probability: 1.0,
            send_failure_rate: 0.0,
            ..Default::default()
        }
    }

    /// Builder: set the downlink probability
    pub fn downlink_probability(mut self, p: f64) -> Self {
        self.downlink_probability = p.clamp(0.0, 1.0);
        self
    }

    /// Builder: set the send failure rate
    pub fn send_failure_rate(mut self, p: f64) -> Self {
        self.send_failure_rate = p.clamp(0.0, 1.0);
        self
    }

    /// Builder: set the seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Everything the CLI can load from one file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepwiseConfig {
    /// Engine settings
    pub engine: EngineConfig,
    /// Polling loop settings
    pub driver: DriverConfig,
    /// Uplink protocol timing
    pub uplink: UplinkConfig,
    /// Simulated radio behaviour
    pub radio: RadioConfig,
}

/// Configuration loading error
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid JSON for this schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl StepwiseConfig {
    /// Parse from a JSON string; missing sections fall back to defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Pretty JSON rendering
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.max_frames, 16);
        assert_eq!(config.child_policy, ChildPolicy::Discard);
        assert!(!config.trace_frames);
    }

    #[test]
    fn test_strict_rejects_replacement() {
        assert_eq!(EngineConfig::strict().child_policy, ChildPolicy::Reject);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = StepwiseConfig::from_json_str(
            r#"{ "engine": { "child_policy": "reject" }, "uplink": { "warmup_ms": 20 } }"#,
        )
        .unwrap();
        assert_eq!(config.engine.child_policy, ChildPolicy::Reject);
        assert_eq!(config.engine.max_frames, 16);
        assert_eq!(config.uplink.warmup_ms, 20);
        assert_eq!(config.uplink.max_send_attempts, 3);
        assert_eq!(config.driver.max_ticks, 10_000);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let err = StepwiseConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_radio_builder_clamps() {
        let radio = RadioConfig::default().downlink_probability(1.5).send_failure_rate(-1.0);
        assert_eq!(radio.downlink_probability, 1.0);
        assert_eq!(radio.send_failure_rate, 0.0);
    }
}
