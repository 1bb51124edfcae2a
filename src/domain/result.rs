//! Per-direction analysis results and the cross-view session summary

use crate::domain::types::{PostureMetrics, ShotDirection};
use bytes::Bytes;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A successfully scored view (possibly degenerate: score 0, metrics zero)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredView {
    pub score: u8,
    pub message: String,
    pub metrics: PostureMetrics,
    /// Required joints were missing; the score was forced to 0
    pub degenerate: bool,
}

/// Analysis state of a single direction
#[derive(Debug, Clone, PartialEq)]
pub enum ViewOutcome {
    Pending,
    Scored(ScoredView),
    Failed { error: String },
}

/// Analysis outcome for one capture direction
///
/// Images are held behind `Arc` so snapshots can be published to observers
/// without copying pixels.
#[derive(Debug, Clone)]
pub struct DirectionalResult {
    pub direction: ShotDirection,
    /// Encoded photo as captured
    pub source: Bytes,
    /// Normalized raster, present once the photo decoded
    pub preview: Option<Arc<RgbaImage>>,
    /// Preview with the detected skeleton drawn on top
    pub skeleton: Option<Arc<RgbaImage>>,
    pub outcome: ViewOutcome,
}

impl DirectionalResult {
    pub fn pending(direction: ShotDirection, source: Bytes) -> Self {
        Self { direction, source, preview: None, skeleton: None, outcome: ViewOutcome::Pending }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.outcome, ViewOutcome::Pending)
    }

    pub fn scored(&self) -> Option<&ScoredView> {
        match &self.outcome {
            ViewOutcome::Scored(view) => Some(view),
            _ => None,
        }
    }

    pub fn score(&self) -> Option<u8> {
        self.scored().map(|v| v.score)
    }

    pub fn message(&self) -> Option<&str> {
        self.scored().map(|v| v.message.as_str())
    }

    pub fn metrics(&self) -> Option<&PostureMetrics> {
        self.scored().map(|v| &v.metrics)
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ViewOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Cross-view postural finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finding {
    ShoulderAsymmetry,
    PelvisAsymmetry,
    KneeAsymmetry,
    TorsoLean,
    ForwardHead,
}

impl Finding {
    pub fn label(&self) -> &'static str {
        match self {
            Finding::ShoulderAsymmetry => "shoulder asymmetry",
            Finding::PelvisAsymmetry => "pelvis asymmetry",
            Finding::KneeAsymmetry => "knee asymmetry",
            Finding::TorsoLean => "torso lean",
            Finding::ForwardHead => "forward head posture",
        }
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Aggregate outcome of a four-direction session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Rounded mean of the scored views; None when nothing could be scored
    pub overall_score: Option<u8>,
    pub headline: String,
    pub message: String,
    pub findings: Vec<Finding>,
    pub advice: Vec<String>,
}
