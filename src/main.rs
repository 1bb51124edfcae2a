//! posture-check - four-direction posture analysis from photos
//!
//! Reads one photo per direction, runs keypoint detection through the
//! configured detector program, scores each view and writes a report image
//! with a text sidecar.
//!
//! Usage:
//!   posture-check --front f.jpg --right r.jpg --back b.jpg --left l.jpg
//!
//! Module structure:
//! - `domain/` - Core types (directions, joints, results)
//! - `services/` - Capture state machine, extraction, scoring, summary, coordinator
//! - `io/` - Camera, keypoint detector, skeleton/report rendering, history
//! - `infra/` - Config and metrics

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use posture_check::app;
use posture_check::domain::{DirectionalImage, ShotDirection};
use posture_check::infra::{Config, Metrics};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Analyze posture from four directional photos
#[derive(Parser, Debug)]
#[command(name = "posture-check", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Front photo
    #[arg(long)]
    front: PathBuf,

    /// Right-side photo
    #[arg(long)]
    right: PathBuf,

    /// Back photo
    #[arg(long)]
    back: PathBuf,

    /// Left-side photo
    #[arg(long)]
    left: PathBuf,

    /// Output report image (a .txt sidecar is written next to it)
    #[arg(short, long, default_value = "posture_report.png")]
    report: PathBuf,

    /// Print the result as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::init_tracing();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        detector = ?config.detector_command(),
        max_dimension = %config.max_dimension(),
        history_enabled = %config.history_enabled(),
        "config_loaded"
    );

    let paths = [
        (ShotDirection::Front, &args.front),
        (ShotDirection::Right, &args.right),
        (ShotDirection::Back, &args.back),
        (ShotDirection::Left, &args.left),
    ];
    let mut shots = Vec::with_capacity(paths.len());
    for (direction, path) in paths {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {} photo {}", direction, path.display()))?;
        shots.push(DirectionalImage::new(direction, Bytes::from(data)));
    }

    let metrics = Arc::new(Metrics::new());
    let reporter = app::spawn_metrics_reporter(metrics.clone(), config.metrics_interval_secs());
    let cancel = app::ctrl_c_cancel();

    let result =
        app::analyze_and_report(&config, shots, &args.report, args.json, metrics.clone(), cancel)
            .await;

    reporter.abort();
    metrics.report().log();
    result?;

    info!("posture-check finished");
    Ok(())
}
