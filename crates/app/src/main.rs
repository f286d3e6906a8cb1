use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use particle_visualiser_core::{
    AnalyserSource, AppConfig, CanvasBounds, DrawList, FrameScheduler, ParticleController,
    SharedControls, SyntheticTrack, TrackSettings, Vignette,
};
use tracing_subscriber::EnvFilter;

fn main() -> particle_visualiser_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo(args) => run_demo(&args),
        Commands::Config { output } => write_default_config(output.as_deref()),
    }
}

fn run_demo(args: &DemoArgs) -> particle_visualiser_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    tracing::info!(frames = args.frames, bpm = args.bpm, seed = ?config.seed, "starting demo");

    let bounds = CanvasBounds::new(args.width, args.height);
    let controls = SharedControls::new(config.particles);
    let controller = ParticleController::new(&config, controls, bounds, Vignette::new())?;

    let track = SyntheticTrack::new(
        TrackSettings {
            bpm: args.bpm,
            drop_after_beats: Some(args.drop_after_beats),
            seed: config.seed.unwrap_or_default(),
            ..Default::default()
        },
        config.audio.sample_rate,
    );
    let source = AnalyserSource::new(track, &config.audio)?;

    let mut scheduler = FrameScheduler::new(
        source,
        controller,
        bounds,
        config.audio.frame_rate,
    )
    .with_realtime(args.realtime);

    let mut canvas = DrawList::new();
    for frame in 0..args.frames {
        if args.pause_at == Some(frame) {
            scheduler.pause();
        }
        let report = scheduler.tick(&mut canvas)?;
        tracing::debug!(
            frame,
            live = report.live,
            circles = canvas.len(),
            vignette = scheduler.controller().effects().intensity(),
            "frame rendered"
        );
    }

    let summary = scheduler.summary().clone();
    tracing::info!(
        beats = summary.beats,
        loud = summary.loud_beats,
        very_loud = summary.very_loud_beats,
        drops = summary.bass_drops,
        peak_particles = summary.peak_particles,
        bpm = ?summary.final_bpm,
        "demo finished"
    );

    if let Some(path) = &args.report {
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
        tracing::info!(?path, "wrote run summary");
    }
    Ok(())
}

fn write_default_config(output: Option<&Path>) -> particle_visualiser_core::Result<()> {
    let json = AppConfig::default().to_json_pretty()?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!(?path, "wrote default configuration");
        }
        None => println!("{json}"),
    }
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
#[command(author, version, about = "Beat-reactive particle visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a generated track headlessly and report what the pipeline saw.
    Demo(DemoArgs),
    /// Print or write the default configuration as JSON.
    Config {
        /// Destination file. Prints to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct DemoArgs {
    /// JSON configuration file; missing fields use defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Number of animation frames to run.
    #[arg(short, long, default_value_t = 600)]
    frames: u64,
    /// Tempo of the generated track.
    #[arg(long, default_value_t = 128.0)]
    bpm: f32,
    /// Beat after which the generated bass line swells.
    #[arg(long, default_value_t = 32)]
    drop_after_beats: u32,
    /// Overrides the configured random seed.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 1280.0)]
    width: f32,
    #[arg(long, default_value_t = 720.0)]
    height: f32,
    /// Pace frames at the configured frame rate instead of running flat out.
    #[arg(long)]
    realtime: bool,
    /// Pause playback at this frame, triggering the particle exit animation.
    #[arg(long)]
    pause_at: Option<u64>,
    /// Write the run summary as JSON to this file.
    #[arg(long)]
    report: Option<PathBuf>,
}
