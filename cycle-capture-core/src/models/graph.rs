use std::fmt;

/// Opaque handle to a node in the host's audio graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Opaque handle to a readable media stream owned by a hardware context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaStreamId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Graph-side half of a capture sink: the node audio is mirrored into and
/// the stream a recorder reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkEndpoint {
    pub node: NodeId,
    pub stream: MediaStreamId,
}
