//! Shared runtime plumbing for the binaries
//!
//! Logging setup and the analyze → persist → report flow both binaries end
//! with once they hold four shots.

use crate::domain::types::DirectionalImage;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::events::create_event_channel;
use crate::io::history::HistoryWriter;
use crate::io::keypoints::CommandKeypointProvider;
use crate::io::report::{report_lines, ReportComposer};
use crate::services::coordinator::{AnalysisCoordinator, AnalysisOutcome, AnalysisStatus};
use anyhow::{anyhow, Context};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Structured logging; level via RUST_LOG, default info
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Log a metrics summary every `interval_secs` until the task is aborted
pub fn spawn_metrics_reporter(metrics: Arc<Metrics>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics.report().log();
        }
    })
}

/// Cancel flag flipped by Ctrl+C
pub fn ctrl_c_cancel() -> watch::Receiver<bool> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancel_signal_received");
            cancel_tx.send_replace(true);
        }
    });
    cancel_rx
}

/// Analyze four shots, record the session and write the report.
///
/// Prints the report text (or JSON with `json`) to stdout.
pub async fn analyze_and_report(
    config: &Config,
    shots: Vec<DirectionalImage>,
    report_path: &Path,
    json: bool,
    metrics: Arc<Metrics>,
    cancel: watch::Receiver<bool>,
) -> anyhow::Result<AnalysisOutcome> {
    let provider = CommandKeypointProvider::from_config(config)
        .ok_or_else(|| anyhow!("no keypoint detector configured ([detector] command)"))?;
    info!(program = %provider.program(), "detector_configured");

    // Fail on a bad font before spending time on detection
    let composer = ReportComposer::from_config(config).context("Failed to set up report")?;

    let (coordinator, _state_rx) =
        AnalysisCoordinator::new(config, Arc::new(provider), metrics.clone());

    let history = if config.history_enabled() {
        let (events, events_rx) = create_event_channel(16, metrics.clone());
        let writer = HistoryWriter::new(config.history_file());
        Some((events, tokio::spawn(writer.run(events_rx))))
    } else {
        None
    };

    let outcome = match &history {
        Some((events, _)) => {
            let coordinator = coordinator.with_events(events.clone());
            coordinator.start(shots, cancel).await?
        }
        None => coordinator.start(shots, cancel).await?,
    };

    // Close the event channel so the writer drains and stops
    if let Some((events, handle)) = history {
        drop(events);
        match handle.await {
            Ok(written) => info!(written = %written, "history_flushed"),
            Err(e) => warn!(error = %e, "history_writer_failed"),
        }
    }

    let Some(summary) = &outcome.summary else {
        let AnalysisStatus::Incomplete { processed } = outcome.status else {
            return Ok(outcome);
        };
        warn!(processed = %processed, "analysis_incomplete");
        if json {
            println!("{}", json!({ "session_id": outcome.session_id, "status": "incomplete", "processed": processed }));
        } else {
            println!("Analysis cancelled after {processed} of 4 directions.");
        }
        return Ok(outcome);
    };

    let report = composer.compose(&outcome.items, summary).context("Failed to compose report")?;
    report.save(report_path).context("Failed to save report")?;

    if json {
        let views: Vec<_> = outcome
            .items
            .iter()
            .map(|i| {
                json!({
                    "direction": i.direction,
                    "score": i.score(),
                    "message": i.message(),
                    "metrics": i.metrics(),
                    "error": i.error(),
                })
            })
            .collect();
        let doc = json!({
            "session_id": outcome.session_id,
            "status": "complete",
            "summary": summary,
            "views": views,
            "report": report_path.display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        for line in report_lines(&outcome.items, summary) {
            println!("{line}");
        }
        println!("Report: {}", report_path.display());
    }
    Ok(outcome)
}
