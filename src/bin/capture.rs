//! posture-capture - interactive four-direction capture session
//!
//! Drives the timed capture sequence against a directory of photos standing in
//! for a camera (`front.jpg`, `right.jpg`, `back.jpg`, `left.jpg`; png also
//! accepted), then analyzes the shots and writes the report.
//!
//! Commands on stdin (one per line):
//! - s (or empty line): start the countdown for the current direction
//! - c: cancel the countdown, or end the session while waiting
//! - q: quit
//!
//! Usage:
//!   posture-capture --shots-dir shots/ --countdown 3

use anyhow::bail;
use clap::Parser;
use posture_check::app;
use posture_check::infra::{Config, Metrics};
use posture_check::io::DirectoryCamera;
use posture_check::services::capture::{CaptureCommand, CaptureDriver, CaptureOutcome, CaptureState};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "posture-capture", version, about = "Interactive posture capture session")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Directory with one photo per direction
    #[arg(short, long)]
    shots_dir: PathBuf,

    /// Override the countdown length in seconds
    #[arg(long)]
    countdown: Option<u32>,

    /// Output report image
    #[arg(short, long, default_value = "posture_report.png")]
    report: PathBuf,

    /// Print the result as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn parse_command(line: &str) -> Option<CaptureCommand> {
    match line.trim() {
        "" | "s" | "start" => Some(CaptureCommand::Start),
        "c" | "cancel" => Some(CaptureCommand::Cancel),
        "q" | "quit" => Some(CaptureCommand::Teardown),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::init_tracing();

    let args = Args::parse();
    let mut config = Config::load_from_path(&args.config);
    if let Some(secs) = args.countdown {
        config = config.with_countdown_secs(secs);
    }
    info!(
        config_file = %config.config_file(),
        shots_dir = %args.shots_dir.display(),
        countdown_secs = %config.countdown_secs(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());
    let camera = Arc::new(DirectoryCamera::new(&args.shots_dir));
    let (driver, mut state_rx) = CaptureDriver::new(&config, camera, metrics.clone());
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let session = tokio::spawn(driver.run(cmd_rx));

    // Prompt on every state change
    let watcher = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let snap = state_rx.borrow_and_update().clone();
            match (&snap.state, snap.seconds_remaining) {
                (CaptureState::AwaitingUserStart { direction }, _) => {
                    println!("[{}/4] Face {direction}. Press Enter to start, c to cancel.", snap.shots_taken + 1)
                }
                (CaptureState::Countdown { .. }, Some(secs)) => println!("  {secs}..."),
                (CaptureState::Capturing { direction }, _) => println!("  capturing {direction}"),
                (state, _) if state.is_terminal() => break,
                _ => {}
            }
        }
    });

    // stdin → commands on a plain thread so exit never waits on a pending read
    let input_tx = cmd_tx.clone();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(cmd) => {
                    if input_tx.blocking_send(cmd).is_err() {
                        break;
                    }
                }
                None => println!("unknown command: {}", line.trim()),
            }
        }
    });
    drop(cmd_tx);

    let outcome = session.await?;
    watcher.abort();

    let shots = match outcome {
        CaptureOutcome::Complete(shots) => shots,
        CaptureOutcome::Cancelled { shots_taken } => {
            println!("Capture cancelled after {shots_taken} shots.");
            metrics.report().log();
            return Ok(());
        }
        CaptureOutcome::Failed { reason } => {
            metrics.report().log();
            bail!("capture failed: {reason}");
        }
    };

    let result = app::analyze_and_report(
        &config,
        shots,
        &args.report,
        args.json,
        metrics.clone(),
        app::ctrl_c_cancel(),
    )
    .await;
    metrics.report().log();
    result?;
    Ok(())
}
