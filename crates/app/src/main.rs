use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand};
use pulsescope_core::{
    record, CollectingSurface, DrawingMode, MediaPlayer, Permissions, Runtime, SimulatedPlayer,
    Song, SyntheticBackend, Tone, Viewport, VisualizerConfig,
};
use tracing_subscriber::EnvFilter;

const STEP: Duration = Duration::from_millis(100);

fn main() -> pulsescope_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            title,
            seconds,
            mode,
            config,
            output_dir,
            dump_frame,
        } => run_simulate(SimulateOptions {
            title,
            seconds,
            mode,
            config,
            output_dir,
            dump_frame,
        }),
        Commands::Inspect { file } => run_inspect(&file),
        Commands::Config => run_config(),
    }
}

struct SimulateOptions {
    title: String,
    seconds: u64,
    mode: DrawingMode,
    config: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    dump_frame: Option<PathBuf>,
}

fn run_simulate(args: SimulateOptions) -> pulsescope_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => VisualizerConfig::load(path)?,
        None => VisualizerConfig::default(),
    };
    if let Some(dir) = args.output_dir {
        config.recording.output_dir = dir;
    }
    tracing::info!(title = %args.title, seconds = args.seconds, mode = ?args.mode, "starting simulation");

    let backend = SyntheticBackend::new(vec![
        Tone::new(110.0, 0.5),
        Tone::new(440.0, 0.3),
        Tone::new(1_760.0, 0.15),
    ]);
    let surface = CollectingSurface::new(Viewport::new(1080.0, 1920.0));
    let mut runtime = Runtime::new(
        &config,
        SimulatedPlayer::new(),
        backend,
        surface,
        Permissions::granted(),
    )?;
    runtime.set_drawing_mode(args.mode);
    let progress = runtime.progress_mut().subscribe();

    let duration_ms = args.seconds.saturating_mul(1_000);
    runtime
        .player_mut()
        .load(Song::new(1, args.title.clone(), duration_ms));

    let end = Duration::from_millis(duration_ms);
    while runtime.now() < end {
        runtime.advance_by(STEP.min(end - runtime.now()));
    }

    let recording = runtime
        .lifecycle()
        .recorder()
        .output_path()
        .map(|path| path.to_path_buf());
    let samples = progress.try_iter().count();
    let last_progress = runtime.progress().latest();
    let frames = runtime.surface().frames();
    let last_frame = runtime.surface().last_frame().to_vec();
    let player_position = runtime.player().position_ms();

    runtime.shutdown();
    for incident in runtime.take_incidents() {
        tracing::warn!(at_ms = incident.at_ms, kind = ?incident.kind, "{}", incident.message);
    }

    match &recording {
        Some(path) => {
            let size = std::fs::metadata(path)?.len();
            println!("recording:      {} ({size} bytes)", path.display());
        }
        None => println!("recording:      none"),
    }
    println!("frames:         {frames}");
    println!("progress polls: {samples}");
    match last_progress {
        Some(progress) => println!("progress:       {}", progress.format_mm_ss()),
        None => println!("progress:       {player_position} ms"),
    }

    if let Some(path) = args.dump_frame {
        let json = serde_json::to_string_pretty(&last_frame)?;
        std::fs::write(&path, json)?;
        tracing::info!(path = %path.display(), commands = last_frame.len(), "wrote last frame");
    }
    Ok(())
}

fn run_inspect(file: &Path) -> pulsescope_core::Result<()> {
    tracing::info!(?file, "inspecting recording");
    let stats = record::inspect(file)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn run_config() -> pulsescope_core::Result<()> {
    println!("{}", serde_json::to_string_pretty(&VisualizerConfig::default())?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless audio visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a synthetic track through the full capture, render and record pipeline.
    Simulate {
        /// Track title, also used to name the recording.
        #[arg(short, long, default_value = "Synthetic Track")]
        title: String,
        /// Length of the simulated track in seconds.
        #[arg(short, long, default_value_t = 5)]
        seconds: u64,
        /// Drawing mode: waveform, spectrum or both.
        #[arg(short, long, default_value = "both")]
        mode: DrawingMode,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory that receives the `.pcm` recording.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Write the last rendered frame as JSON draw commands.
        #[arg(long)]
        dump_frame: Option<PathBuf>,
    },
    /// Print statistics for a recorded `.pcm` file.
    Inspect {
        /// Path to the recording.
        file: PathBuf,
    },
    /// Print the default configuration as JSON.
    Config,
}
