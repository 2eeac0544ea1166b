// Command-line entry point - scan inputs, segment each video, print JSON reports
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};

use scene_pipeline::scanner::{analyze_paths, collect_inputs};
use scene_pipeline::{KeyframePolicy, SceneReport, Settings};

#[derive(Parser, Debug)]
#[command(name = "scene-pipeline", author, version)]
#[command(about = "Split videos into scenes and print a JSON report per video")]
struct Args {
    /// Video files or directories to scan for videos
    #[arg(required = true, value_name = "PATH")]
    inputs: Vec<PathBuf>,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Frames sampled per second of video
    #[arg(short = 'r', long, value_name = "FPS")]
    sample_rate: Option<f64>,

    /// Content delta above which a new scene starts (0-255)
    #[arg(short, long, value_name = "SCORE")]
    threshold: Option<f64>,

    /// Which frame represents each scene
    #[arg(long, value_enum)]
    keyframe_policy: Option<KeyframePolicy>,

    /// Write each scene's representative frame as JPEG into this directory
    #[arg(long, value_name = "DIR")]
    keyframes: Option<PathBuf>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,

    /// Decode on a background thread with this many frames of lookahead
    #[arg(long, value_name = "FRAMES")]
    prefetch: Option<usize>,

    /// Log level or filter directive, overridden by RUST_LOG
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load_or_default(args.config.as_deref())
        .context("failed to load settings")?;

    // Command line wins over the settings file
    let pipeline = &mut settings.pipeline;
    if let Some(rate) = args.sample_rate {
        pipeline.sample_rate_fps = rate;
    }
    if let Some(threshold) = args.threshold {
        pipeline.boundary_threshold = threshold;
    }
    if let Some(policy) = args.keyframe_policy {
        pipeline.keyframe_policy = policy;
    }
    if let Some(prefetch) = args.prefetch {
        pipeline.prefetch = prefetch;
    }
    pipeline.validate().context("invalid pipeline options")?;

    // Logs go to stderr so stdout stays valid JSON
    let level = args.log_level.unwrap_or(settings.logging.level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.parse().unwrap_or_default()),
        )
        .with_writer(std::io::stderr)
        .init();

    let paths = collect_inputs(&args.inputs);
    if paths.is_empty() {
        bail!("no video files found in the given inputs");
    }

    let keyframe_dir = args.keyframes.or(settings.output.keyframe_dir);
    info!(
        videos = paths.len(),
        sample_rate_fps = settings.pipeline.sample_rate_fps,
        boundary_threshold = settings.pipeline.boundary_threshold,
        "starting scene detection"
    );

    let outcomes = analyze_paths(&paths, &settings.pipeline, keyframe_dir.as_deref());

    let mut reports: Vec<SceneReport> = Vec::with_capacity(outcomes.len());
    let mut failed = 0usize;
    for outcome in outcomes {
        match outcome.result {
            Ok(report) => reports.push(report),
            Err(e) => {
                failed += 1;
                error!(path = %outcome.path.display(), error = %e, "scene detection failed");
            }
        }
    }

    let json = if args.pretty {
        serde_json::to_string_pretty(&reports)?
    } else {
        serde_json::to_string(&reports)?
    };

    match &args.output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }

    if failed > 0 {
        bail!("{failed} of {} inputs failed", paths.len());
    }
    Ok(())
}
