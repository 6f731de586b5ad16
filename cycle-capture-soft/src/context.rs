//! Software implementation of the host audio context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use cycle_capture_core::{
    AudioGraph, ExportError, GraphError, HardwareAudioContext, HardwareRecorder, MediaStreamId, NodeId,
    SampleBuffer, SinkEndpoint,
};

use crate::container;
use crate::graph::{GraphState, SoftNode};
use crate::recorder::SoftRecorder;

/// Output format of a `SoftAudioContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for SoftConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// An audio context whose graph renders in memory.
///
/// Frame 0 of the graph's timeline is the moment the context was created;
/// recorders render the span of the timeline they were running for.
pub struct SoftAudioContext {
    config: SoftConfig,
    graph: Arc<Mutex<GraphState>>,
    destination: NodeId,
    origin: Instant,
    next_stream: AtomicU64,
}

impl SoftAudioContext {
    pub fn new(config: SoftConfig) -> Result<Self, ExportError> {
        if config.sample_rate == 0 {
            return Err(ExportError::Configuration("sample rate must be positive".into()));
        }
        if config.channels == 0 {
            return Err(ExportError::Configuration("channel count must be positive".into()));
        }

        let mut graph = GraphState::new(config.sample_rate);
        let destination = graph.add_node(SoftNode::Destination);
        Ok(Self {
            config,
            graph: Arc::new(Mutex::new(graph)),
            destination,
            origin: Instant::now(),
            next_stream: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> SoftConfig {
        self.config
    }

    pub fn add_oscillator(&self, frequency: f32, amplitude: f32) -> NodeId {
        self.graph.lock().add_node(SoftNode::Oscillator { frequency, amplitude })
    }

    pub fn add_gain(&self, gain: f32) -> NodeId {
        self.graph.lock().add_node(SoftNode::Gain(gain))
    }

    pub fn add_constant(&self, value: f32) -> NodeId {
        self.graph.lock().add_node(SoftNode::Constant(value))
    }

    /// Nodes currently connected into `node`.
    pub fn inputs(&self, node: NodeId) -> Vec<NodeId> {
        self.graph.lock().inputs(node)
    }

    /// Render mono output of `node` at absolute frames `start..start + frames`.
    pub fn render(&self, node: NodeId, start: u64, frames: usize) -> Vec<f32> {
        self.graph.lock().render(node, start, frames)
    }
}

impl AudioGraph for SoftAudioContext {
    fn destination(&self) -> NodeId {
        self.destination
    }

    fn connect(&self, source: NodeId, destination: NodeId) -> Result<(), GraphError> {
        self.graph.lock().connect(source, destination)?;
        log::trace!("Connected {} -> {}", source, destination);
        Ok(())
    }
}

#[async_trait]
impl HardwareAudioContext for SoftAudioContext {
    fn create_capture_sink(&self) -> Result<SinkEndpoint, ExportError> {
        let node = self.graph.lock().add_node(SoftNode::Sink);
        let stream = MediaStreamId(self.next_stream.fetch_add(1, Ordering::Relaxed));
        log::debug!("Created capture sink {} with stream {:?}", node, stream);
        Ok(SinkEndpoint { node, stream })
    }

    fn create_recorder(&self, sink: &SinkEndpoint) -> Result<Box<dyn HardwareRecorder>, ExportError> {
        match self.graph.lock().node(sink.node) {
            Some(SoftNode::Sink) => {}
            Some(other) => {
                return Err(ExportError::Recording(format!(
                    "{} is a {:?}, not a capture sink",
                    sink.node, other
                )))
            }
            None => return Err(ExportError::Recording(format!("unknown capture sink {}", sink.node))),
        }

        Ok(Box::new(SoftRecorder::new(
            Arc::clone(&self.graph),
            sink.node,
            self.config,
            self.origin,
        )))
    }

    async fn decode(&self, data: Vec<u8>) -> Result<SampleBuffer, String> {
        tokio::task::yield_now().await;
        container::decode(&data).map_err(|e| e.to_string())
    }
}
