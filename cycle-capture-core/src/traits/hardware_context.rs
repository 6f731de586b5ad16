use async_trait::async_trait;

use crate::models::error::ExportError;
use crate::models::graph::SinkEndpoint;
use crate::models::sample_buffer::SampleBuffer;
use crate::traits::recorder::HardwareRecorder;

/// The platform audio context the engine plays through.
///
/// Implemented by:
/// - `SoftAudioContext` (in-process software backend)
#[async_trait]
pub trait HardwareAudioContext: Send + Sync {
    /// Allocate a node plus readable stream that audio can be mirrored into.
    fn create_capture_sink(&self) -> Result<SinkEndpoint, ExportError>;

    /// Create a recorder reading the stream behind `sink`.
    fn create_recorder(&self, sink: &SinkEndpoint) -> Result<Box<dyn HardwareRecorder>, ExportError>;

    /// Decode a complete recorded container into linear samples.
    async fn decode(&self, data: Vec<u8>) -> Result<SampleBuffer, String>;
}
