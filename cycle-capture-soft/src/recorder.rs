//! Recorder that renders a capture sink's span of the graph timeline.
//!
//! Runs as a tokio task. On every flush tick it renders the frames that
//! became due since the last flush, so a recording always covers exactly
//! the wall-clock span between `start()` and `stop()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use cycle_capture_core::{ExportError, HardwareRecorder, NodeId, RecorderEvent, RecorderEventSender};

use crate::container;
use crate::context::SoftConfig;
use crate::graph::GraphState;

pub struct SoftRecorder {
    graph: Arc<Mutex<GraphState>>,
    node: NodeId,
    config: SoftConfig,
    origin: Instant,
    running: Arc<AtomicBool>,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SoftRecorder {
    pub(crate) fn new(graph: Arc<Mutex<GraphState>>, node: NodeId, config: SoftConfig, origin: Instant) -> Self {
        Self {
            graph,
            node,
            config,
            origin,
            running: Arc::new(AtomicBool::new(false)),
            stop: CancellationToken::new(),
            task: None,
        }
    }
}

impl HardwareRecorder for SoftRecorder {
    fn start(&mut self, flush_interval: Duration, events: RecorderEventSender) -> Result<(), ExportError> {
        if self.running.load(Ordering::SeqCst) || self.task.is_some() {
            return Err(ExportError::Recording("recorder already started".into()));
        }
        if flush_interval.is_zero() {
            return Err(ExportError::Recording("flush interval must be positive".into()));
        }
        let handle = Handle::try_current()
            .map_err(|e| ExportError::Recording(format!("no async runtime for recorder: {}", e)))?;

        let started = Instant::now();
        let start_frame = frames_between(self.origin, started, self.config.sample_rate);
        let run = RecordingRun {
            graph: Arc::clone(&self.graph),
            node: self.node,
            config: self.config,
            started,
            start_frame,
            flush_interval,
        };

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let stop = self.stop.clone();
        self.task = Some(handle.spawn(async move {
            run.record(stop, events).await;
            running.store(false, Ordering::SeqCst);
        }));

        log::debug!(
            "Soft recorder started on {} at frame {} ({} Hz, {} ch)",
            self.node,
            start_frame,
            self.config.sample_rate,
            self.config.channels
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.cancel();
    }

    fn is_recording(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.stop.is_cancelled()
    }
}

impl Drop for SoftRecorder {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

struct RecordingRun {
    graph: Arc<Mutex<GraphState>>,
    node: NodeId,
    config: SoftConfig,
    started: Instant,
    start_frame: u64,
    flush_interval: Duration,
}

impl RecordingRun {
    async fn record(self, stop: CancellationToken, events: RecorderEventSender) {
        let mut ticker = time::interval_at(self.started + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut header = Some(container::encode_header(self.config.channels, self.config.sample_rate));
        let mut emitted: u64 = 0;

        loop {
            let finished = tokio::select! {
                _ = stop.cancelled() => true,
                _ = ticker.tick() => false,
            };

            let due = frames_between(self.started, Instant::now(), self.config.sample_rate);
            let frames = due.saturating_sub(emitted) as usize;
            let mut fragment = Vec::new();
            if frames > 0 {
                if let Some(header) = header.take() {
                    fragment.extend_from_slice(&header);
                }
                let samples = self.render(self.start_frame + emitted, frames);
                fragment.extend(container::encode_samples(&samples));
                emitted += frames as u64;
            }

            if events.send(RecorderEvent::DataAvailable(fragment)).is_err() {
                log::debug!("Recorder event receiver dropped, stopping");
                return;
            }
            if finished {
                log::debug!("Soft recorder stopped after {} frames", emitted);
                let _ = events.send(RecorderEvent::Stopped);
                return;
            }
        }
    }

    /// Interleaved frames, with the sink's mono mix copied to every channel.
    fn render(&self, start: u64, frames: usize) -> Vec<f32> {
        let mono = self.graph.lock().render(self.node, start, frames);
        let channels = self.config.channels as usize;
        let mut interleaved = Vec::with_capacity(frames * channels);
        for sample in mono {
            interleaved.extend(std::iter::repeat(sample).take(channels));
        }
        interleaved
    }
}

fn frames_between(from: Instant, to: Instant, sample_rate: u32) -> u64 {
    let elapsed = to.saturating_duration_since(from);
    (elapsed.as_nanos() * sample_rate as u128 / 1_000_000_000) as u64
}
