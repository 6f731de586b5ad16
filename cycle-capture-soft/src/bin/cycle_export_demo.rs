use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use cycle_capture_core::{
    write_export, AudioGraph, AudioGraphTap, CaptureOrchestrator, ExportConfiguration, ExportSettings,
    HardwareAudioContext, ProgressSnapshot,
};
use cycle_capture_soft::{SoftAudioContext, SoftClock, SoftConfig};

#[derive(Parser)]
#[command(author, version, about = "Export a cycle-aligned loop from the software audio backend")]
struct Cli {
    /// Number of cycles to capture.
    #[arg(long, default_value_t = 2)]
    cycles: u32,
    /// Engine tempo in cycles per second.
    #[arg(long)]
    cps: Option<f64>,
    /// Engine position (in cycles) when the export starts.
    #[arg(long, default_value_t = 0.37)]
    position: f64,
    /// Session name; becomes the archive folder.
    #[arg(long, default_value = "demo loop")]
    name: String,
    /// Oscillator frequency in Hz.
    #[arg(long, default_value_t = 220.0)]
    frequency: f32,
    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,
    /// Directory to write the archive and its metadata sidecar into.
    #[arg(long, default_value = ".")]
    out: PathBuf,
    /// JSON file with export tuning (flush/poll intervals, stop timeout, default cps).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to build async runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<ExportConfiguration>(&json)
                .with_context(|| format!("{} is not a valid export configuration", path.display()))?
        }
        None => ExportConfiguration::default(),
    };

    let context = Arc::new(SoftAudioContext::new(SoftConfig {
        sample_rate: cli.sample_rate,
        channels: 2,
    })?);

    let tap = AudioGraphTap::global();
    let graph = tap.install_interception(Arc::clone(&context) as Arc<dyn AudioGraph>);

    let hardware = Arc::clone(&context) as Arc<dyn HardwareAudioContext>;
    let sink = tap
        .begin_capture(Some(&hardware))
        .context("failed to create a capture sink")?;

    // The engine builds its graph through the tap, so this voice is mirrored.
    let voice = context.add_oscillator(cli.frequency, 0.8);
    let level = context.add_gain(0.5);
    graph.connect(voice, level)?;
    graph.connect(level, graph.destination())?;

    let orchestrator = CaptureOrchestrator::new(config)?;
    orchestrator.set_capture_sink(sink);

    let clock = SoftClock::new(cli.cps, cli.position);
    let settings = ExportSettings::new(cli.cycles, cli.name.clone());
    let report = |p: &ProgressSnapshot| {
        log::info!(
            "{:?} {:5.1}% (cycle {:?} of {:?})",
            p.phase,
            p.progress,
            p.current_cycle,
            p.total_cycles
        );
    };

    let outcome = orchestrator.export(&settings, &clock, &report).await;
    tap.end_capture();
    let result = outcome?;

    let path = write_export(&result, &cli.out)?;
    println!(
        "{} ({:.2}s, {} Hz, {} ch, sha256 {})",
        path.display(),
        result.metadata.captured_duration_secs,
        result.metadata.sample_rate,
        result.metadata.channels,
        result.metadata.checksum
    );
    Ok(())
}
