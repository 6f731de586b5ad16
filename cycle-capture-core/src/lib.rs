//! # cycle-capture-core
//!
//! Platform-agnostic core for cycle-aligned audio export.
//!
//! Captures what a pattern engine sends to the hardware output, starting on
//! a cycle boundary, then decodes, re-encodes as 16-bit PCM WAV and bundles
//! the result into a zip archive. Platform backends implement the
//! collaborator traits (`AudioGraph`, `HardwareAudioContext`,
//! `HardwareRecorder`, `CycleClock`) and plug into `AudioGraphTap` and
//! `CaptureOrchestrator`.
//!
//! ## Architecture
//!
//! ```text
//! cycle-capture-core (this crate)
//! ├── traits/       ← AudioGraph, HardwareAudioContext, HardwareRecorder, CycleClock
//! ├── models/       ← ExportError, ExportPhase, ProgressSnapshot, settings, SampleBuffer
//! ├── routing/      ← AudioGraphTap (conditional mirroring into a capture sink)
//! ├── processing/   ← cycle timing, WAV header + encoder
//! ├── session/      ← CaptureOrchestrator (record → decode → encode → bundle)
//! └── storage/      ← zip bundling, metadata sidecar
//! ```

pub mod models;
pub mod processing;
pub mod routing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::capture_sink::CaptureSink;
pub use models::config::{ExportConfiguration, ExportSettings, DEFAULT_CPS};
pub use models::error::{ExportError, GraphError};
pub use models::export_result::{ExportMetadata, ExportResult};
pub use models::graph::{MediaStreamId, NodeId, SinkEndpoint};
pub use models::sample_buffer::SampleBuffer;
pub use models::state::{ExportPhase, ProgressSnapshot};
pub use processing::wav_encoder::encode as encode_wav;
pub use routing::tap::AudioGraphTap;
pub use session::orchestrator::{CaptureOrchestrator, ProgressCallback};
pub use storage::bundle_builder::{create_archive, sanitize_name, MIX_FILE_NAME};
pub use storage::metadata::{read_metadata, write_export};
pub use traits::audio_graph::AudioGraph;
pub use traits::cycle_clock::{CycleClock, FixedClock};
pub use traits::hardware_context::HardwareAudioContext;
pub use traits::recorder::{HardwareRecorder, RecorderEvent, RecorderEventReceiver, RecorderEventSender};
