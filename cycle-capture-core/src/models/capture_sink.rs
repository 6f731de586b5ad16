use std::fmt;
use std::sync::Arc;

use super::graph::{NodeId, SinkEndpoint};
use crate::traits::hardware_context::HardwareAudioContext;

/// A capture sink bound to the hardware context that created it.
///
/// Cloning is cheap; every clone refers to the same graph node and stream.
#[derive(Clone)]
pub struct CaptureSink {
    endpoint: SinkEndpoint,
    context: Arc<dyn HardwareAudioContext>,
}

impl CaptureSink {
    pub fn new(endpoint: SinkEndpoint, context: Arc<dyn HardwareAudioContext>) -> Self {
        Self { endpoint, context }
    }

    /// Graph node that mirrored connections are routed into.
    pub fn node(&self) -> NodeId {
        self.endpoint.node
    }

    pub fn endpoint(&self) -> &SinkEndpoint {
        &self.endpoint
    }

    pub fn context(&self) -> &Arc<dyn HardwareAudioContext> {
        &self.context
    }
}

impl fmt::Debug for CaptureSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSink").field("endpoint", &self.endpoint).finish_non_exhaustive()
    }
}
