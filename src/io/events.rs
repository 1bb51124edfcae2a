//! Typed channel for analysis lifecycle events
//!
//! External collaborators (score history, usage gating) observe completed
//! sessions through this channel. Sending never blocks the analysis: when the
//! buffer is full the event is dropped and counted.

use crate::domain::result::{DirectionalResult, Finding, SessionSummary};
use crate::domain::types::ShotDirection;
use crate::infra::metrics::Metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Score (or failure) of one direction within a session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionScore {
    pub direction: ShotDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload emitted when an analysis session finishes all four directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// UUIDv7 session identifier
    pub session_id: String,
    pub completed_at: DateTime<Utc>,
    pub overall_score: Option<u8>,
    pub scores: Vec<DirectionScore>,
    pub findings: Vec<Finding>,
}

impl SessionRecord {
    pub fn new(session_id: String, results: &[DirectionalResult], summary: &SessionSummary) -> Self {
        let scores = results
            .iter()
            .map(|r| DirectionScore {
                direction: r.direction,
                score: r.score(),
                error: r.error().map(str::to_string),
            })
            .collect();
        Self {
            session_id,
            completed_at: Utc::now(),
            overall_score: summary.overall_score,
            scores,
            findings: summary.findings.clone(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Events observable by collaborators
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    /// Analysis just completed for every direction
    Completed(SessionRecord),
}

/// Sender handle for analysis events
///
/// Clone this to share across producers. Non-blocking.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<AnalysisEvent>,
    metrics: Arc<Metrics>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<AnalysisEvent>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics }
    }

    /// Publish a completed session; dropped if the channel is full or closed
    pub fn send_completed(&self, record: SessionRecord) -> bool {
        let session_id = record.session_id.clone();
        match self.tx.try_send(AnalysisEvent::Completed(record)) {
            Ok(()) => true,
            Err(e) => {
                self.metrics.record_event_dropped();
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "full",
                    mpsc::error::TrySendError::Closed(_) => "closed",
                };
                warn!(session_id = %session_id, reason = %reason, "analysis_event_dropped");
                false
            }
        }
    }
}

/// Create a new event channel pair
pub fn create_event_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (EventSender, mpsc::Receiver<AnalysisEvent>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (EventSender::new(tx, metrics), rx)
}
