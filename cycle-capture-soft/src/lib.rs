//! # cycle-capture-soft
//!
//! In-process software backend for `cycle-capture-core`.
//!
//! Plays the part of the host's audio hardware: a small node graph that
//! renders deterministically, capture sinks, a tokio-driven recorder that
//! flushes a simple container format, and a cycle clock that advances with
//! tokio's clock. Used by the `cycle-export-demo` binary and for exercising
//! the full capture pipeline without real audio devices.

pub mod clock;
pub mod container;
pub mod context;
pub mod graph;
pub mod recorder;

pub use clock::SoftClock;
pub use container::ContainerError;
pub use context::{SoftAudioContext, SoftConfig};
pub use graph::SoftNode;
pub use recorder::SoftRecorder;
