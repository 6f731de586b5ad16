use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tempo assumed when the clock cannot report one (a 2-second cycle).
pub const DEFAULT_CPS: f64 = 0.5;

/// Per-export request from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    /// Number of whole cycles to capture (at least 1).
    pub cycles: u32,

    /// User-supplied name, sanitized before it becomes the archive folder.
    pub session_name: String,
}

impl ExportSettings {
    pub fn new(cycles: u32, session_name: impl Into<String>) -> Self {
        Self {
            cycles,
            session_name: session_name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.cycles == 0 {
            return Err("cycles must be at least 1".into());
        }
        Ok(())
    }
}

/// Tuning knobs for the capture orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfiguration {
    /// How often the hardware recorder flushes a fragment (default: 100 ms).
    pub flush_interval_ms: u64,

    /// Progress polling period while recording (default: 100 ms).
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for the recorder's final flush (default: 2 s).
    pub stop_timeout_ms: u64,

    /// Cycles per second used when the clock reports none.
    pub default_cps: f64,

    /// Progress values reported during the encoding phase.
    pub encoding_checkpoints: [f64; 2],
}

impl ExportConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.flush_interval_ms == 0 {
            return Err("flush interval must be positive".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll interval must be positive".into());
        }
        if !self.default_cps.is_finite() || self.default_cps <= 0.0 {
            return Err(format!("invalid default cps: {}", self.default_cps));
        }
        let [first, second] = self.encoding_checkpoints;
        if !(0.0..=100.0).contains(&first) || !(0.0..=100.0).contains(&second) || first > second {
            return Err(format!(
                "encoding checkpoints must be ascending within [0, 100]: {:?}",
                self.encoding_checkpoints
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for ExportConfiguration {
    fn default() -> Self {
        Self {
            flush_interval_ms: 100,
            poll_interval_ms: 100,
            stop_timeout_ms: 2000,
            default_cps: DEFAULT_CPS,
            encoding_checkpoints: [50.0, 80.0],
        }
    }
}
