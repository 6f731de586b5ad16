use serde::{Deserialize, Serialize};

/// Export session phase.
///
/// Phase transitions:
/// ```text
/// preparing → recording → encoding → complete
///     ↓           ↓           ↓
///     └────────── failed ─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportPhase {
    Preparing,
    Recording,
    Encoding,
    Complete,
    Failed,
}

impl ExportPhase {
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether `next` is a legal successor of this phase.
    pub fn can_transition_to(&self, next: ExportPhase) -> bool {
        match (self, next) {
            (Self::Preparing, Self::Recording) => true,
            (Self::Recording, Self::Encoding) => true,
            (Self::Encoding, Self::Complete) => true,
            (Self::Preparing | Self::Recording | Self::Encoding, Self::Failed) => true,
            _ => false,
        }
    }
}

/// Point-in-time progress report handed to the host's progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub phase: ExportPhase,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    pub current_cycle: Option<u32>,
    pub total_cycles: Option<u32>,
}

impl ProgressSnapshot {
    /// Build a snapshot, clamping `progress` into `[0, 100]`.
    pub fn new(phase: ExportPhase, progress: f64) -> Self {
        let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 100.0) };
        Self {
            phase,
            progress,
            current_cycle: None,
            total_cycles: None,
        }
    }

    pub fn with_cycles(mut self, current: Option<u32>, total: u32) -> Self {
        self.current_cycle = current;
        self.total_cycles = Some(total);
        self
    }

    /// Snapshot for a recording tick `elapsed_secs` into a capture of `target_secs`.
    pub fn recording(elapsed_secs: f64, target_secs: f64, total_cycles: u32) -> Self {
        let fraction = if target_secs > 0.0 { elapsed_secs / target_secs } else { 1.0 };
        let current = (fraction * total_cycles as f64).floor().max(0.0) as u32;
        Self::new(ExportPhase::Recording, (fraction * 100.0).min(100.0))
            .with_cycles(Some(current.min(total_cycles)), total_cycles)
    }
}
