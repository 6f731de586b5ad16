//! Conditional mirroring of hardware-bound connections into a capture sink.
//!
//! The pattern engine connects nodes through an `AudioGraph` it receives from
//! the host. Installing the tap wraps that graph once; while a capture is
//! active, every connection into the hardware destination is duplicated into
//! the capture sink, so the recording hears exactly what the speakers hear.
//!
//! ```text
//! engine ── connect(src, destination) ──► InterceptingGraph ──► inner graph
//!                                              │ (active only)
//!                                              └── connect(src, sink) ──► inner graph
//! ```

use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;

use crate::models::capture_sink::CaptureSink;
use crate::models::error::GraphError;
use crate::models::graph::NodeId;
use crate::traits::audio_graph::AudioGraph;
use crate::traits::hardware_context::HardwareAudioContext;

static GLOBAL_TAP: Lazy<AudioGraphTap> = Lazy::new(AudioGraphTap::new);

/// Shared between the tap and its intercepting graph.
#[derive(Default)]
struct TapState {
    active: bool,
    sink: Option<CaptureSink>,
    context: Option<Arc<dyn HardwareAudioContext>>,
}

/// Capture tap over the host's audio graph.
///
/// `sink` is only ever set while `active` is true. The interception wrapper
/// is installed at most once and never removed, so connections made through
/// it stay valid across captures.
pub struct AudioGraphTap {
    state: Arc<Mutex<TapState>>,
    installed: OnceCell<Arc<InterceptingGraph>>,
}

impl AudioGraphTap {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TapState::default())),
            installed: OnceCell::new(),
        }
    }

    /// The process-wide tap.
    pub fn global() -> &'static AudioGraphTap {
        &GLOBAL_TAP
    }

    /// Wrap `graph` so connections can be mirrored. The first call installs
    /// the wrapper; later calls return it unchanged.
    pub fn install_interception(&self, graph: Arc<dyn AudioGraph>) -> Arc<dyn AudioGraph> {
        let mut fresh = false;
        let wrapper = self.installed.get_or_init(|| {
            fresh = true;
            Arc::new(InterceptingGraph {
                inner: graph,
                state: Arc::clone(&self.state),
            })
        });
        if fresh {
            log::info!("Audio graph interception installed");
        } else {
            log::debug!("Audio graph interception already installed");
        }
        Arc::clone(wrapper) as Arc<dyn AudioGraph>
    }

    pub fn is_installed(&self) -> bool {
        self.installed.get().is_some()
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// The sink receiving mirrored audio, while a capture is active.
    pub fn sink(&self) -> Option<CaptureSink> {
        self.state.lock().sink.clone()
    }

    /// The hardware context of the most recent capture. Kept after
    /// `end_capture` so the host can begin the next capture on it.
    pub fn context(&self) -> Option<Arc<dyn HardwareAudioContext>> {
        self.state.lock().context.clone()
    }

    /// Start mirroring into a new sink created on `context`.
    ///
    /// Returns `None` without a context or if the context cannot create a sink.
    pub fn begin_capture(&self, context: Option<&Arc<dyn HardwareAudioContext>>) -> Option<CaptureSink> {
        let Some(context) = context else {
            log::warn!("Cannot begin capture without a hardware context");
            return None;
        };

        let endpoint = match context.create_capture_sink() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                log::error!("Failed to create capture sink: {}", e);
                return None;
            }
        };

        let sink = CaptureSink::new(endpoint, Arc::clone(context));
        {
            let mut state = self.state.lock();
            state.sink = Some(sink.clone());
            state.context = Some(Arc::clone(context));
            state.active = true;
        }
        log::info!("Capture tap active on {}", sink.node());
        Some(sink)
    }

    /// Stop mirroring. The wrapper stays installed.
    pub fn end_capture(&self) {
        let mut state = self.state.lock();
        state.active = false;
        state.sink = None;
        log::info!("Capture tap inactive");
    }
}

impl Default for AudioGraphTap {
    fn default() -> Self {
        Self::new()
    }
}

/// The wrapper handed to the engine in place of the host graph.
struct InterceptingGraph {
    inner: Arc<dyn AudioGraph>,
    state: Arc<Mutex<TapState>>,
}

impl InterceptingGraph {
    fn mirror_target(&self, destination: NodeId) -> Option<CaptureSink> {
        if destination != self.inner.destination() {
            return None;
        }
        let state = self.state.lock();
        if !state.active {
            return None;
        }
        state.sink.clone()
    }
}

impl AudioGraph for InterceptingGraph {
    fn destination(&self) -> NodeId {
        self.inner.destination()
    }

    fn connect(&self, source: NodeId, destination: NodeId) -> Result<(), GraphError> {
        self.inner.connect(source, destination)?;

        if let Some(sink) = self.mirror_target(destination) {
            if let Err(e) = self.inner.connect(source, sink.node()) {
                log::warn!("Failed to mirror {} into capture sink {}: {}", source, sink.node(), e);
            }
        }
        Ok(())
    }
}
