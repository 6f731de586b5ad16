use crate::models::error::GraphError;
use crate::models::graph::NodeId;

/// The host's node-connection primitive.
///
/// The pattern engine builds its graph exclusively through this trait, which
/// is what lets `AudioGraphTap` observe connections without the engine's
/// cooperation.
pub trait AudioGraph: Send + Sync {
    /// The hardware output endpoint.
    fn destination(&self) -> NodeId;

    /// Route `source`'s output into `destination`.
    fn connect(&self, source: NodeId, destination: NodeId) -> Result<(), GraphError>;
}
