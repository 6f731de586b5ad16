use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::capture_sink::CaptureSink;
use crate::models::config::{ExportConfiguration, ExportSettings};
use crate::models::error::ExportError;
use crate::models::export_result::{CaptureFacts, ExportMetadata, ExportResult};
use crate::models::state::{ExportPhase, ProgressSnapshot};
use crate::processing::{timing, wav_encoder};
use crate::storage::{bundle_builder, metadata};
use crate::traits::cycle_clock::CycleClock;
use crate::traits::recorder::{HardwareRecorder, RecorderEvent, RecorderEventReceiver};

/// Progress callback handed to `CaptureOrchestrator::export`.
pub type ProgressCallback<'a> = &'a (dyn Fn(&ProgressSnapshot) + Send + Sync);

/// State of the one live export.
struct CaptureSession {
    id: u64,
    phase: ExportPhase,
    fragments: Vec<Vec<u8>>,
    target_duration: f64,
    start_time: Option<Instant>,
    recorder: Option<Box<dyn HardwareRecorder>>,
    cancel: CancellationToken,
    last_progress: f64,
}

impl CaptureSession {
    fn new(id: u64, cancel: CancellationToken) -> Self {
        Self {
            id,
            phase: ExportPhase::Preparing,
            fragments: Vec::new(),
            target_duration: 0.0,
            start_time: None,
            recorder: None,
            cancel,
            last_progress: 0.0,
        }
    }
}

struct OrchestratorState {
    sink: Option<CaptureSink>,
    session: Option<CaptureSession>,
}

/// Drives one cycle-aligned export from capture to archive.
///
/// Data flow:
/// ```text
/// [CaptureSink stream] → [HardwareRecorder] → fragments ─┐
///                                                         ├→ decode → WAV → zip
/// [CycleClock] → boundary wait / target duration ─────────┘
/// ```
///
/// `export` and `dispose` both take `&self`; `dispose` may run while an
/// export is suspended and makes it resolve with `ExportError::Cancelled`.
pub struct CaptureOrchestrator {
    config: ExportConfiguration,
    state: Mutex<OrchestratorState>,
    next_session_id: AtomicU64,
}

impl CaptureOrchestrator {
    pub fn new(config: ExportConfiguration) -> Result<Self, ExportError> {
        config.validate().map_err(ExportError::Configuration)?;
        Ok(Self {
            config,
            state: Mutex::new(OrchestratorState {
                sink: None,
                session: None,
            }),
            next_session_id: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &ExportConfiguration {
        &self.config
    }

    /// Bind the tap's capture sink. Must precede `export`.
    pub fn set_capture_sink(&self, sink: CaptureSink) {
        log::debug!("Capture sink bound: {:?}", sink.endpoint());
        self.state.lock().sink = Some(sink);
    }

    pub fn has_capture_sink(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// Phase of the live export, if any.
    pub fn phase(&self) -> Option<ExportPhase> {
        self.state.lock().session.as_ref().map(|s| s.phase)
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().session.is_some()
    }

    /// Stop any running recorder and drop all in-flight state, including
    /// the sink binding. Safe to call at any time, any number of times.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        if let Some(mut session) = state.session.take() {
            session.cancel.cancel();
            if let Some(mut recorder) = session.recorder.take() {
                if recorder.is_recording() {
                    recorder.stop();
                }
            }
            let recorded = session.start_time.map_or(0.0, |t| t.elapsed().as_secs_f64());
            log::info!(
                "Export {} disposed during {:?} after {:.2}s of {:.2}s, discarding {} fragments",
                session.id,
                session.phase,
                recorded,
                session.target_duration,
                session.fragments.len()
            );
        }
        state.sink = None;
    }

    /// Record `settings.cycles` cycles starting at the next cycle boundary
    /// and return them as `<session>/mix.wav` inside a zip archive.
    ///
    /// Only one export may be live at a time; a second call while one is
    /// running is rejected with `ExportError::Configuration`.
    pub async fn export(
        &self,
        settings: &ExportSettings,
        clock: &dyn CycleClock,
        on_progress: ProgressCallback<'_>,
    ) -> Result<ExportResult, ExportError> {
        let outcome = match self.open_session(settings) {
            Ok((id, sink, cancel)) => {
                let outcome = self.run(id, &sink, &cancel, settings, clock, on_progress).await;
                if let Err(e) = &outcome {
                    log::error!("Export {} failed: {}", id, e);
                    self.fail_session(id, settings, on_progress);
                }
                self.close_session(id);
                outcome
            }
            Err(e) => {
                log::error!("Export rejected: {}", e);
                on_progress(&ProgressSnapshot::new(ExportPhase::Failed, 0.0).with_cycles(None, settings.cycles));
                Err(e)
            }
        };

        if let Ok(result) = &outcome {
            log::info!(
                "Export {} complete: {} bytes, {:.2}s captured",
                result.metadata.folder_name,
                result.archive.len(),
                result.metadata.captured_duration_secs
            );
        }
        outcome
    }

    // --- Internal helpers ---

    fn open_session(&self, settings: &ExportSettings) -> Result<(u64, CaptureSink, CancellationToken), ExportError> {
        let mut state = self.state.lock();
        let sink = state.sink.clone().ok_or_else(|| {
            ExportError::Configuration("no capture sink bound; call set_capture_sink first".into())
        })?;
        settings.validate().map_err(ExportError::Configuration)?;
        if state.session.is_some() {
            return Err(ExportError::Configuration("an export is already in progress".into()));
        }

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        state.session = Some(CaptureSession::new(id, cancel.clone()));
        log::info!("Export {} preparing: {} cycles of {:?}", id, settings.cycles, settings.session_name);
        Ok((id, sink, cancel))
    }

    /// Move session `id` to `Failed` and report it with the last progress it
    /// reached. A session already torn down by `dispose` still gets a
    /// `Failed` report, from zero.
    fn fail_session(&self, id: u64, settings: &ExportSettings, on_progress: ProgressCallback<'_>) {
        let failed = |progress| ProgressSnapshot::new(ExportPhase::Failed, progress).with_cycles(None, settings.cycles);
        let delivered = self
            .with_session(id, |s| s.last_progress)
            .is_some_and(|progress| self.report(id, on_progress, failed(progress)));
        if !delivered {
            on_progress(&failed(0.0));
        }
    }

    /// Tear down session `id` if it is still the live one.
    fn close_session(&self, id: u64) {
        let mut state = self.state.lock();
        let Some(mut session) = state.session.take_if(|s| s.id == id) else {
            return;
        };
        if let Some(mut recorder) = session.recorder.take() {
            if recorder.is_recording() {
                recorder.stop();
            }
        }
        session.fragments.clear();
        log::debug!("Export {} closed in {:?}", session.id, session.phase);
    }

    async fn run(
        &self,
        id: u64,
        sink: &CaptureSink,
        cancel: &CancellationToken,
        settings: &ExportSettings,
        clock: &dyn CycleClock,
        on_progress: ProgressCallback<'_>,
    ) -> Result<ExportResult, ExportError> {
        self.report(
            id,
            on_progress,
            ProgressSnapshot::new(ExportPhase::Preparing, 0.0).with_cycles(Some(0), settings.cycles),
        );

        let cps = timing::effective_cps(clock.cps(), self.config.default_cps);
        let period = timing::cycle_period(cps);
        let target = timing::target_duration(settings.cycles, period);
        if timing::as_duration(target).is_none() {
            return Err(ExportError::Configuration(format!(
                "{} cycles at {} cps is not a representable duration",
                settings.cycles, cps
            )));
        }
        self.with_session(id, |s| s.target_duration = target);

        let position = clock.now();
        let wait = timing::boundary_wait(position, period).ok_or_else(|| {
            ExportError::Configuration(format!("cycle boundary at {} cps is not a representable wait", cps))
        })?;
        log::debug!(
            "Export {}: cps {:.3}, position {:.3}, waiting {:?} for cycle boundary",
            id,
            cps,
            position,
            wait
        );
        sleep_or_cancel(cancel, wait).await?;

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut recorder = sink.context().create_recorder(sink.endpoint())?;
        recorder.start(self.config.flush_interval(), events_tx)?;
        let start = Instant::now();
        {
            let mut state = self.state.lock();
            match state.session.as_mut().filter(|s| s.id == id) {
                Some(session) => {
                    session.recorder = Some(recorder);
                    session.start_time = Some(start);
                }
                None => {
                    recorder.stop();
                    return Err(ExportError::Cancelled);
                }
            }
        }

        let stopped = self
            .record_until(id, cancel, &mut events, start, target, settings.cycles, on_progress)
            .await?;

        match self.take_recorder(id) {
            Some(mut recorder) => recorder.stop(),
            None => return Err(ExportError::Cancelled),
        }
        if !stopped {
            match time::timeout(self.config.stop_timeout(), self.drain_until_stopped(id, cancel, &mut events)).await {
                Ok(result) => result?,
                Err(_) => log::warn!(
                    "Export {}: recorder did not finish flushing within {:?}",
                    id,
                    self.config.stop_timeout()
                ),
            }
        }

        let fragments = self
            .with_session(id, |s| std::mem::take(&mut s.fragments))
            .ok_or(ExportError::Cancelled)?;
        if fragments.is_empty() {
            return Err(ExportError::EmptyCapture);
        }

        let [decoded_checkpoint, encoded_checkpoint] = self.config.encoding_checkpoints;
        self.report(
            id,
            on_progress,
            ProgressSnapshot::new(ExportPhase::Encoding, decoded_checkpoint).with_cycles(None, settings.cycles),
        );

        let blob = fragments.concat();
        log::debug!("Export {}: decoding {} fragments ({} bytes)", id, fragments.len(), blob.len());
        let buffer = tokio::select! {
            _ = cancel.cancelled() => return Err(ExportError::Cancelled),
            decoded = sink.context().decode(blob) => decoded.map_err(ExportError::Decode)?,
        };
        if buffer.number_of_channels() == 0 {
            return Err(ExportError::Decode("decoded buffer has no channels".into()));
        }

        let wav =
            wav_encoder::encode(&buffer).map_err(|e| ExportError::Archive(format!("cannot encode WAV: {}", e)))?;
        self.report(
            id,
            on_progress,
            ProgressSnapshot::new(ExportPhase::Encoding, encoded_checkpoint).with_cycles(None, settings.cycles),
        );

        let checksum = metadata::sha256_hex(&wav);
        let wav_bytes = wav.len() as u64;
        let folder_name = bundle_builder::sanitize_name(&settings.session_name);
        let archive = bundle_builder::create_archive(&BTreeMap::from([(folder_name.clone(), wav)]))?;

        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        let metadata = ExportMetadata::from_capture(
            CaptureFacts {
                session_name: settings.session_name.clone(),
                folder_name,
                cycles: settings.cycles,
                cps,
                target_duration_secs: target,
                captured_duration_secs: buffer.duration_secs(),
                sample_rate: buffer.sample_rate(),
                channels: buffer.number_of_channels() as u16,
            },
            wav_bytes,
            checksum,
        );

        self.report(
            id,
            on_progress,
            ProgressSnapshot::new(ExportPhase::Complete, 100.0).with_cycles(Some(settings.cycles), settings.cycles),
        );
        Ok(ExportResult { archive, metadata })
    }

    /// Poll progress until `target` seconds have elapsed, collecting
    /// fragments as they arrive. Returns whether the recorder already
    /// reported `Stopped`.
    #[allow(clippy::too_many_arguments)]
    async fn record_until(
        &self,
        id: u64,
        cancel: &CancellationToken,
        events: &mut RecorderEventReceiver,
        start: Instant,
        target: f64,
        cycles: u32,
        on_progress: ProgressCallback<'_>,
    ) -> Result<bool, ExportError> {
        let mut ticker = time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut events_open = true;
        let mut stopped = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ExportError::Cancelled),
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        if self.handle_recorder_event(id, event)? {
                            log::warn!("Export {}: recorder stopped before the target duration", id);
                            stopped = true;
                        }
                    }
                    None => events_open = false,
                },
                _ = ticker.tick() => {
                    let elapsed = start.elapsed().as_secs_f64();
                    self.report(id, on_progress, ProgressSnapshot::recording(elapsed, target, cycles));
                    if elapsed >= target {
                        break;
                    }
                }
            }
        }
        Ok(stopped || !events_open)
    }

    /// Collect the recorder's final flush.
    async fn drain_until_stopped(
        &self,
        id: u64,
        cancel: &CancellationToken,
        events: &mut RecorderEventReceiver,
    ) -> Result<(), ExportError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ExportError::Cancelled),
                event = events.recv() => match event {
                    Some(event) => {
                        if self.handle_recorder_event(id, event)? {
                            return Ok(());
                        }
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    /// Apply one recorder event. Returns `true` on `Stopped`.
    fn handle_recorder_event(&self, id: u64, event: RecorderEvent) -> Result<bool, ExportError> {
        match event {
            RecorderEvent::DataAvailable(data) => {
                if data.is_empty() {
                    return Ok(false);
                }
                log::debug!("Export {}: fragment of {} bytes", id, data.len());
                self.with_session(id, |s| s.fragments.push(data));
                Ok(false)
            }
            RecorderEvent::Error(message) => Err(ExportError::Recording(message)),
            RecorderEvent::Stopped => Ok(true),
        }
    }

    fn take_recorder(&self, id: u64) -> Option<Box<dyn HardwareRecorder>> {
        self.with_session(id, |s| s.recorder.take()).flatten()
    }

    fn with_session<T>(&self, id: u64, f: impl FnOnce(&mut CaptureSession) -> T) -> Option<T> {
        let mut state = self.state.lock();
        state.session.as_mut().filter(|s| s.id == id).map(f)
    }

    /// Record `snapshot` on session `id` and hand it to the host. Returns
    /// `false` without calling back once the session has been torn down.
    fn report(&self, id: u64, on_progress: ProgressCallback<'_>, snapshot: ProgressSnapshot) -> bool {
        let live = self
            .with_session(id, |s| {
                if s.phase != snapshot.phase {
                    if !s.phase.can_transition_to(snapshot.phase) {
                        log::warn!("Export {}: unexpected transition {:?} → {:?}", s.id, s.phase, snapshot.phase);
                    }
                    log::info!("Export {}: {:?} → {:?}", s.id, s.phase, snapshot.phase);
                    s.phase = snapshot.phase;
                }
                s.last_progress = snapshot.progress;
            })
            .is_some();
        if live {
            on_progress(&snapshot);
        }
        live
    }
}

impl Default for CaptureOrchestrator {
    fn default() -> Self {
        Self {
            config: ExportConfiguration::default(),
            state: Mutex::new(OrchestratorState {
                sink: None,
                session: None,
            }),
            next_session_id: AtomicU64::new(0),
        }
    }
}

async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> Result<(), ExportError> {
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(ExportError::Cancelled),
        _ = time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use approx::assert_abs_diff_eq;
    use async_trait::async_trait;

    use super::*;
    use crate::models::graph::{MediaStreamId, NodeId, SinkEndpoint};
    use crate::models::sample_buffer::SampleBuffer;
    use crate::traits::cycle_clock::FixedClock;
    use crate::traits::hardware_context::HardwareAudioContext;
    use crate::traits::recorder::RecorderEventSender;

    /// Four samples per fragment at 40 Hz: fragments cover real time at the
    /// default 100 ms flush interval.
    const TEST_RATE: u32 = 40;
    const FRAGMENT_VALUE: f32 = 0.25;

    #[derive(Debug, Clone, Copy)]
    enum Script {
        Emit,
        Silent,
        FailAfter(u32),
    }

    #[derive(Default)]
    struct Tracker {
        started_at: Mutex<Option<Instant>>,
        stop_calls: AtomicU64,
    }

    struct ScriptedContext {
        script: Script,
        decode_fails: bool,
        tracker: Arc<Tracker>,
    }

    struct ScriptedRecorder {
        script: Script,
        tracker: Arc<Tracker>,
        cancel: Option<CancellationToken>,
        recording: Arc<AtomicBool>,
    }

    fn fragment() -> Vec<u8> {
        [FRAGMENT_VALUE; 4].iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    impl HardwareRecorder for ScriptedRecorder {
        fn start(&mut self, flush_interval: Duration, events: RecorderEventSender) -> Result<(), ExportError> {
            *self.tracker.started_at.lock() = Some(Instant::now());
            let cancel = CancellationToken::new();
            self.cancel = Some(cancel.clone());
            self.recording.store(true, Ordering::SeqCst);

            let script = self.script;
            let recording = Arc::clone(&self.recording);
            tokio::spawn(async move {
                let mut ticker = time::interval_at(Instant::now() + flush_interval, flush_interval);
                let mut sent = 0u32;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            if matches!(script, Script::Emit) {
                                let _ = events.send(RecorderEvent::DataAvailable(fragment()));
                            }
                            let _ = events.send(RecorderEvent::Stopped);
                            break;
                        }
                        _ = ticker.tick() => match script {
                            Script::Emit => {
                                let _ = events.send(RecorderEvent::DataAvailable(fragment()));
                                let _ = events.send(RecorderEvent::DataAvailable(Vec::new()));
                            }
                            Script::Silent => {}
                            Script::FailAfter(limit) => {
                                if sent == limit {
                                    let _ = events.send(RecorderEvent::Error("device lost".into()));
                                    recording.store(false, Ordering::SeqCst);
                                    break;
                                }
                                let _ = events.send(RecorderEvent::DataAvailable(fragment()));
                                sent += 1;
                            }
                        }
                    }
                }
            });
            Ok(())
        }

        fn stop(&mut self) {
            self.tracker.stop_calls.fetch_add(1, Ordering::SeqCst);
            self.recording.store(false, Ordering::SeqCst);
            if let Some(cancel) = self.cancel.take() {
                cancel.cancel();
            }
        }

        fn is_recording(&self) -> bool {
            self.recording.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HardwareAudioContext for ScriptedContext {
        fn create_capture_sink(&self) -> Result<SinkEndpoint, ExportError> {
            Ok(SinkEndpoint {
                node: NodeId(1),
                stream: MediaStreamId(1),
            })
        }

        fn create_recorder(&self, _sink: &SinkEndpoint) -> Result<Box<dyn HardwareRecorder>, ExportError> {
            Ok(Box::new(ScriptedRecorder {
                script: self.script,
                tracker: Arc::clone(&self.tracker),
                cancel: None,
                recording: Arc::new(AtomicBool::new(false)),
            }))
        }

        async fn decode(&self, data: Vec<u8>) -> Result<SampleBuffer, String> {
            if self.decode_fails {
                return Err("unsupported container".into());
            }
            let samples: Vec<f32> = data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            SampleBuffer::new(TEST_RATE, vec![samples])
        }
    }

    fn sink_for(script: Script, decode_fails: bool) -> (CaptureSink, Arc<Tracker>) {
        let tracker = Arc::new(Tracker::default());
        let context: Arc<dyn HardwareAudioContext> = Arc::new(ScriptedContext {
            script,
            decode_fails,
            tracker: Arc::clone(&tracker),
        });
        let endpoint = context.create_capture_sink().unwrap();
        (CaptureSink::new(endpoint, context), tracker)
    }

    fn orchestrator_with(script: Script, decode_fails: bool) -> (CaptureOrchestrator, Arc<Tracker>) {
        let orchestrator = CaptureOrchestrator::default();
        let (sink, tracker) = sink_for(script, decode_fails);
        orchestrator.set_capture_sink(sink);
        (orchestrator, tracker)
    }

    #[derive(Default)]
    struct ProgressLog(Mutex<Vec<ProgressSnapshot>>);

    impl ProgressLog {
        fn record(&self, snapshot: &ProgressSnapshot) {
            self.0.lock().push(*snapshot);
        }

        fn snapshots(&self) -> Vec<ProgressSnapshot> {
            self.0.lock().clone()
        }

        fn phases(&self) -> Vec<ExportPhase> {
            self.snapshots().iter().map(|s| s.phase).collect()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn export_without_sink_is_configuration_error() {
        let orchestrator = CaptureOrchestrator::default();
        let log = ProgressLog::default();
        let result = orchestrator
            .export(&ExportSettings::new(1, "x"), &FixedClock::new(Some(1.0), 0.0), &|s| log.record(s))
            .await;

        assert!(matches!(result, Err(ExportError::Configuration(_))));
        assert_eq!(log.phases(), vec![ExportPhase::Failed]);
        assert!(!orchestrator.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_cycles_is_configuration_error() {
        let (orchestrator, tracker) = orchestrator_with(Script::Emit, false);
        let result = orchestrator
            .export(&ExportSettings::new(0, "x"), &FixedClock::new(Some(1.0), 0.0), &|_| {})
            .await;

        assert!(matches!(result, Err(ExportError::Configuration(_))));
        assert!(tracker.started_at.lock().is_none());
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = ExportConfiguration {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(CaptureOrchestrator::new(config), Err(ExportError::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn export_produces_archive_with_progress() {
        let (orchestrator, tracker) = orchestrator_with(Script::Emit, false);
        let log = ProgressLog::default();
        let settings = ExportSettings::new(2, "Loop #1");

        let result = orchestrator
            .export(&settings, &FixedClock::new(Some(1.0), 0.0), &|s| log.record(s))
            .await
            .unwrap();

        // Archive layout and WAV contents.
        let mut zip = zip::ZipArchive::new(Cursor::new(result.archive.clone())).unwrap();
        let mut wav = Vec::new();
        std::io::Read::read_to_end(&mut zip.by_name("Loop__1/mix.wav").unwrap(), &mut wav).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav.clone())).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, TEST_RATE);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|&s| s == wav_encoder::sample_to_pcm16(FRAGMENT_VALUE)));

        // Metadata describes what was written.
        assert_eq!(result.metadata.folder_name, "Loop__1");
        assert_eq!(result.metadata.cycles, 2);
        assert_eq!(result.metadata.cps, 1.0);
        assert_eq!(result.metadata.target_duration_secs, 2.0);
        assert_eq!(result.metadata.wav_bytes, wav.len() as u64);
        assert_eq!(result.metadata.checksum, metadata::sha256_hex(&wav));
        assert!(result.metadata.captured_duration_secs >= 2.0);

        // Progress: phases in order, recording monotonic, finishing at exactly 100.
        let snapshots = log.snapshots();
        let mut phases = log.phases();
        phases.dedup();
        assert_eq!(
            phases,
            vec![
                ExportPhase::Preparing,
                ExportPhase::Recording,
                ExportPhase::Encoding,
                ExportPhase::Complete
            ]
        );
        let recording: Vec<f64> = snapshots
            .iter()
            .filter(|s| s.phase == ExportPhase::Recording)
            .map(|s| s.progress)
            .collect();
        assert!(recording.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(recording.last().copied(), Some(100.0));
        let encoding: Vec<f64> = snapshots
            .iter()
            .filter(|s| s.phase == ExportPhase::Encoding)
            .map(|s| s.progress)
            .collect();
        assert_eq!(encoding, vec![50.0, 80.0]);
        let last = snapshots.last().unwrap();
        assert_eq!(last.phase, ExportPhase::Complete);
        assert_eq!(last.progress, 100.0);
        assert_eq!(last.current_cycle, Some(2));

        // Session torn down, sink still bound for the next export.
        assert!(!orchestrator.is_active());
        assert!(orchestrator.has_capture_sink());
        assert_eq!(tracker.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recording_starts_on_cycle_boundary() {
        let (orchestrator, tracker) = orchestrator_with(Script::Emit, false);
        let before = Instant::now();

        orchestrator
            .export(&ExportSettings::new(1, "aligned"), &FixedClock::new(Some(0.5), 2.3), &|_| {})
            .await
            .unwrap();

        let started = tracker.started_at.lock().unwrap();
        assert_abs_diff_eq!((started - before).as_secs_f64(), 1.4, epsilon = 0.002);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_tempo_uses_default_period() {
        let (orchestrator, _tracker) = orchestrator_with(Script::Emit, false);
        let result = orchestrator
            .export(&ExportSettings::new(1, "slow"), &FixedClock::new(None, 0.0), &|_| {})
            .await
            .unwrap();

        assert_eq!(result.metadata.cps, 0.5);
        assert_eq!(result.metadata.target_duration_secs, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_recorder_is_empty_capture() {
        let (orchestrator, _tracker) = orchestrator_with(Script::Silent, false);
        let log = ProgressLog::default();
        let result = orchestrator
            .export(&ExportSettings::new(1, "quiet"), &FixedClock::new(Some(2.0), 0.0), &|s| log.record(s))
            .await;

        assert_eq!(result.unwrap_err(), ExportError::EmptyCapture);
        let phases = log.phases();
        assert!(!phases.contains(&ExportPhase::Encoding));
        assert_eq!(phases.last(), Some(&ExportPhase::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn recorder_error_aborts_export() {
        let (orchestrator, tracker) = orchestrator_with(Script::FailAfter(2), false);
        let log = ProgressLog::default();
        let result = orchestrator
            .export(&ExportSettings::new(4, "broken"), &FixedClock::new(Some(1.0), 0.0), &|s| log.record(s))
            .await;

        assert_eq!(result.unwrap_err(), ExportError::Recording("device lost".into()));
        let last = log.snapshots().last().copied().unwrap();
        assert_eq!(last.phase, ExportPhase::Failed);
        assert!(last.progress > 0.0 && last.progress < 100.0);
        assert!(!orchestrator.is_active());
        assert!(tracker.started_at.lock().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn decode_failure_is_decode_error() {
        let (orchestrator, _tracker) = orchestrator_with(Script::Emit, true);
        let result = orchestrator
            .export(&ExportSettings::new(1, "garbled"), &FixedClock::new(Some(1.0), 0.0), &|_| {})
            .await;

        assert_eq!(result.unwrap_err(), ExportError::Decode("unsupported container".into()));
        assert!(!orchestrator.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_export_is_rejected() {
        let (orchestrator, _tracker) = orchestrator_with(Script::Emit, false);
        let clock = FixedClock::new(Some(1.0), 0.0);
        let settings = ExportSettings::new(1, "first");

        let (first, second) = tokio::join!(orchestrator.export(&settings, &clock, &|_| {}), async {
            time::sleep(Duration::from_millis(300)).await;
            orchestrator.export(&settings, &clock, &|_| {}).await
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(ExportError::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_mid_recording_discards_everything() {
        let (orchestrator, tracker) = orchestrator_with(Script::Emit, false);
        let clock = FixedClock::new(Some(1.0), 0.0);
        let settings = ExportSettings::new(4, "cancel me");

        let (result, _) = tokio::join!(orchestrator.export(&settings, &clock, &|_| {}), async {
            time::sleep(Duration::from_millis(1500)).await;
            assert_eq!(orchestrator.phase(), Some(ExportPhase::Recording));
            orchestrator.dispose();
            orchestrator.dispose();
        });

        assert_eq!(result.unwrap_err(), ExportError::Cancelled);
        assert!(!orchestrator.is_active());
        assert!(!orchestrator.has_capture_sink());
        assert_eq!(tracker.stop_calls.load(Ordering::SeqCst), 1);

        // A fresh export carries nothing over from the cancelled one.
        let (sink, _) = sink_for(Script::Emit, false);
        orchestrator.set_capture_sink(sink);
        let result = orchestrator.export(&settings, &clock, &|_| {}).await.unwrap();
        assert!(result.metadata.captured_duration_secs >= 4.0);
        assert!(result.metadata.captured_duration_secs <= 4.3);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_during_boundary_wait_never_records() {
        let (orchestrator, tracker) = orchestrator_with(Script::Emit, false);
        let clock = FixedClock::new(Some(0.25), 0.1);

        let settings = ExportSettings::new(1, "early");

        let (result, _) = tokio::join!(
            orchestrator.export(&settings, &clock, &|_| {}),
            async {
                time::sleep(Duration::from_millis(500)).await;
                assert_eq!(orchestrator.phase(), Some(ExportPhase::Preparing));
                orchestrator.dispose();
            }
        );

        assert_eq!(result.unwrap_err(), ExportError::Cancelled);
        assert!(tracker.started_at.lock().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn vanishing_tempo_is_configuration_error() {
        for cps in [1e-30, 1e-310] {
            let (orchestrator, tracker) = orchestrator_with(Script::Emit, false);
            let log = ProgressLog::default();
            let result = orchestrator
                .export(&ExportSettings::new(2, "glacial"), &FixedClock::new(Some(cps), 0.5), &|s| log.record(s))
                .await;

            assert!(matches!(result, Err(ExportError::Configuration(_))), "cps {}", cps);
            assert_eq!(log.phases(), vec![ExportPhase::Preparing, ExportPhase::Failed]);
            assert!(tracker.started_at.lock().is_none());
        }
    }

    /// Decodes every recording to 4096 empty channels, too many for a WAV header.
    struct WideContext(ScriptedContext);

    #[async_trait]
    impl HardwareAudioContext for WideContext {
        fn create_capture_sink(&self) -> Result<SinkEndpoint, ExportError> {
            self.0.create_capture_sink()
        }

        fn create_recorder(&self, sink: &SinkEndpoint) -> Result<Box<dyn HardwareRecorder>, ExportError> {
            self.0.create_recorder(sink)
        }

        async fn decode(&self, _data: Vec<u8>) -> Result<SampleBuffer, String> {
            SampleBuffer::new(TEST_RATE, vec![Vec::new(); 4096])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unencodable_buffer_is_archive_error() {
        let context: Arc<dyn HardwareAudioContext> = Arc::new(WideContext(ScriptedContext {
            script: Script::Emit,
            decode_fails: false,
            tracker: Arc::new(Tracker::default()),
        }));
        let endpoint = context.create_capture_sink().unwrap();
        let orchestrator = CaptureOrchestrator::default();
        orchestrator.set_capture_sink(CaptureSink::new(endpoint, context));

        let result = orchestrator
            .export(&ExportSettings::new(1, "wide"), &FixedClock::new(Some(2.0), 0.0), &|_| {})
            .await;

        assert!(matches!(result, Err(ExportError::Archive(message)) if message.contains("4096 channels")));
        assert!(!orchestrator.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn session_is_failed_when_failure_is_reported() {
        let (orchestrator, _tracker) = orchestrator_with(Script::FailAfter(1), false);
        let phase_at_failure = Mutex::new(None);
        let on_progress = |s: &ProgressSnapshot| {
            if s.phase == ExportPhase::Failed {
                *phase_at_failure.lock() = Some(orchestrator.phase());
            }
        };

        let result = orchestrator
            .export(&ExportSettings::new(2, "broken"), &FixedClock::new(Some(1.0), 0.0), &on_progress)
            .await;

        assert!(matches!(result, Err(ExportError::Recording(_))));
        assert_eq!(phase_at_failure.into_inner(), Some(Some(ExportPhase::Failed)));
        assert_eq!(orchestrator.phase(), None);
    }

    #[test]
    fn progress_is_not_reported_for_a_closed_session() {
        let orchestrator = CaptureOrchestrator::default();
        let log = ProgressLog::default();

        let delivered = orchestrator.report(7, &|s| log.record(s), ProgressSnapshot::recording(0.5, 1.0, 2));

        assert!(!delivered);
        assert!(log.snapshots().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_recording_progress_after_dispose() {
        let (orchestrator, _tracker) = orchestrator_with(Script::Emit, false);
        let log = ProgressLog::default();
        let settings = ExportSettings::new(4, "long");
        let clock = FixedClock::new(Some(1.0), 0.0);

        let on_progress = |s: &ProgressSnapshot| log.record(s);
        let (result, _) = tokio::join!(orchestrator.export(&settings, &clock, &on_progress), async {
            // Lands on a poll tick so the tick and the cancellation are ready together.
            time::sleep(Duration::from_millis(1000)).await;
            orchestrator.dispose();
        });

        assert_eq!(result.unwrap_err(), ExportError::Cancelled);
        let snapshots = log.snapshots();
        let last = snapshots.last().copied().unwrap();
        assert_eq!(last.phase, ExportPhase::Failed);
        assert!(snapshots.iter().all(|s| s.phase != ExportPhase::Recording || s.progress <= 25.0));
    }
}
