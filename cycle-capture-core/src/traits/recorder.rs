use std::time::Duration;

use tokio::sync::mpsc;

use crate::models::error::ExportError;

/// Events a hardware recorder delivers while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// A flushed chunk of the recorded container. May be empty.
    DataAvailable(Vec<u8>),
    /// The recorder failed; no further data follows.
    Error(String),
    /// Final flush finished after `stop()`.
    Stopped,
}

pub type RecorderEventSender = mpsc::UnboundedSender<RecorderEvent>;
pub type RecorderEventReceiver = mpsc::UnboundedReceiver<RecorderEvent>;

/// Media recorder bound to a capture sink's stream.
pub trait HardwareRecorder: Send {
    /// Begin recording, flushing a fragment to `events` every `flush_interval`.
    fn start(&mut self, flush_interval: Duration, events: RecorderEventSender) -> Result<(), ExportError>;

    /// Request a stop. The final fragment and `RecorderEvent::Stopped`
    /// arrive asynchronously on the event channel.
    fn stop(&mut self);

    fn is_recording(&self) -> bool;
}
