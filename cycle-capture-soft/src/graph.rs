//! In-process audio graph with deterministic rendering.
//!
//! Every generator is a pure function of the absolute frame index, so any
//! span of the graph's timeline can be rendered on demand.

use std::collections::BTreeMap;
use std::f32::consts::TAU;

use cycle_capture_core::{GraphError, NodeId};

/// Recursion limit when rendering; deeper (or cyclic) paths render silence.
const MAX_RENDER_DEPTH: usize = 64;

/// A node in the software graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SoftNode {
    /// Sine generator. Ignores inputs.
    Oscillator { frequency: f32, amplitude: f32 },
    /// DC generator. Ignores inputs.
    Constant(f32),
    /// Sum of inputs scaled by a factor.
    Gain(f32),
    /// The hardware output.
    Destination,
    /// Capture sink; sums its inputs.
    Sink,
}

impl SoftNode {
    fn accepts_input(&self) -> bool {
        matches!(self, Self::Gain(_) | Self::Destination | Self::Sink)
    }

    fn produces_output(&self) -> bool {
        !matches!(self, Self::Destination | Self::Sink)
    }
}

#[derive(Debug)]
pub struct GraphState {
    sample_rate: u32,
    nodes: BTreeMap<NodeId, SoftNode>,
    edges: Vec<(NodeId, NodeId)>,
    next_id: u64,
}

impl GraphState {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            next_id: 0,
        }
    }

    pub fn add_node(&mut self, node: SoftNode) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<SoftNode> {
        self.nodes.get(&id).copied()
    }

    /// Connect `source` into `destination`. Repeating an existing
    /// connection is a no-op.
    pub fn connect(&mut self, source: NodeId, destination: NodeId) -> Result<(), GraphError> {
        let source_node = self.nodes.get(&source).ok_or(GraphError::UnknownNode(source.0))?;
        let destination_node = self.nodes.get(&destination).ok_or(GraphError::UnknownNode(destination.0))?;

        if !source_node.produces_output() {
            return Err(GraphError::ConnectionRefused {
                source_node: source.0,
                destination: destination.0,
                reason: format!("{:?} has no output", source_node),
            });
        }
        if !destination_node.accepts_input() {
            return Err(GraphError::ConnectionRefused {
                source_node: source.0,
                destination: destination.0,
                reason: format!("{:?} has no input", destination_node),
            });
        }

        if !self.edges.contains(&(source, destination)) {
            self.edges.push((source, destination));
        }
        Ok(())
    }

    /// Nodes feeding `node`, in connection order.
    pub fn inputs(&self, node: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|(_, dst)| *dst == node)
            .map(|(src, _)| *src)
            .collect()
    }

    /// Render `frames` mono frames of `node` starting at absolute frame `start`.
    pub fn render(&self, node: NodeId, start: u64, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames];
        self.render_into(node, start, &mut out, 0);
        out
    }

    fn render_into(&self, node: NodeId, start: u64, out: &mut [f32], depth: usize) {
        if depth > MAX_RENDER_DEPTH {
            return;
        }
        let Some(kind) = self.nodes.get(&node) else {
            return;
        };

        match *kind {
            SoftNode::Oscillator { frequency, amplitude } => {
                let rate = self.sample_rate as f64;
                for (i, sample) in out.iter_mut().enumerate() {
                    let t = (start + i as u64) as f64 / rate;
                    let phase = (t * frequency as f64).fract() as f32;
                    *sample += amplitude * (TAU * phase).sin();
                }
            }
            SoftNode::Constant(value) => {
                for sample in out.iter_mut() {
                    *sample += value;
                }
            }
            SoftNode::Gain(gain) => {
                let mut mixed = vec![0.0f32; out.len()];
                for input in self.inputs(node) {
                    self.render_into(input, start, &mut mixed, depth + 1);
                }
                for (sample, m) in out.iter_mut().zip(mixed) {
                    *sample += m * gain;
                }
            }
            SoftNode::Destination | SoftNode::Sink => {
                for input in self.inputs(node) {
                    self.render_into(input, start, out, depth + 1);
                }
            }
        }
    }
}
