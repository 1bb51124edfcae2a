//! Posture metrics → 0-100 score and tiered message
//!
//! Thresholds, weights and tier boundaries are the scoring contract and must
//! stay bit-reproducible. Weights sum to 1.0.

use crate::domain::types::PostureMetrics;
use crate::services::extractor::Extraction;
use serde::Serialize;

pub const SHOULDER_DIFF_THRESHOLD: f64 = 0.10;
pub const HIP_DIFF_THRESHOLD: f64 = 0.10;
pub const TORSO_TILT_THRESHOLD_DEG: f64 = 8.0;
pub const HEAD_OFFSET_THRESHOLD: f64 = 0.08;
pub const KNEE_DIFF_THRESHOLD: f64 = 0.12;
pub const ANKLE_DIFF_THRESHOLD: f64 = 0.12;

pub const SHOULDER_WEIGHT: f64 = 0.25;
pub const HIP_WEIGHT: f64 = 0.20;
pub const TORSO_WEIGHT: f64 = 0.15;
pub const HEAD_WEIGHT: f64 = 0.15;
pub const KNEE_WEIGHT: f64 = 0.15;
pub const ANKLE_WEIGHT: f64 = 0.10;

/// Message for a view where shoulders or hips were not detected
pub const DEGENERATE_MESSAGE: &str =
    "Posture not recognized. Please recapture with your full body visible.";

/// Score band shared by per-view messages and the session headline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTier {
    /// 90..=100
    VeryGood,
    /// 75..90
    Good,
    /// 60..75
    Fair,
    /// 0..60
    Poor,
}

impl ScoreTier {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => ScoreTier::VeryGood,
            75..=89 => ScoreTier::Good,
            60..=74 => ScoreTier::Fair,
            _ => ScoreTier::Poor,
        }
    }

    /// Per-view diagnostic message
    pub fn message(&self) -> &'static str {
        match self {
            ScoreTier::VeryGood => "Very good posture. Keep maintaining it.",
            ScoreTier::Good => "Generally good posture with minor asymmetry.",
            ScoreTier::Fair => "Noticeable tilt. Check your alignment.",
            ScoreTier::Poor => "Significant imbalance. A postural reset is needed.",
        }
    }

    /// Short classification used as the session headline
    pub fn headline(&self) -> &'static str {
        match self {
            ScoreTier::VeryGood => "Very good",
            ScoreTier::Good => "Generally good",
            ScoreTier::Fair => "Needs attention",
            ScoreTier::Poor => "Significant imbalance",
        }
    }
}

/// Score and message for one view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostureScore {
    pub score: u8,
    pub tier: ScoreTier,
    pub message: String,
    pub degenerate: bool,
}

#[inline]
fn normalized(value: f64, threshold: f64) -> f64 {
    (value / threshold).min(1.0)
}

/// Weighted penalty in [0, 1]
pub fn penalty(metrics: &PostureMetrics) -> f64 {
    SHOULDER_WEIGHT * normalized(metrics.shoulder_diff, SHOULDER_DIFF_THRESHOLD)
        + HIP_WEIGHT * normalized(metrics.hip_diff, HIP_DIFF_THRESHOLD)
        + TORSO_WEIGHT * normalized(metrics.torso_tilt_deg, TORSO_TILT_THRESHOLD_DEG)
        + HEAD_WEIGHT * normalized(metrics.head_offset_x, HEAD_OFFSET_THRESHOLD)
        + KNEE_WEIGHT * normalized(metrics.knee_diff, KNEE_DIFF_THRESHOLD)
        + ANKLE_WEIGHT * normalized(metrics.ankle_diff, ANKLE_DIFF_THRESHOLD)
}

/// Score measured metrics
pub fn score_metrics(metrics: &PostureMetrics) -> PostureScore {
    let raw = (100.0 * (1.0 - penalty(metrics))).round();
    let score = raw.clamp(0.0, 100.0) as u8;
    let tier = ScoreTier::from_score(score);
    PostureScore {
        score,
        tier,
        message: tier.message().to_string(),
        degenerate: false,
    }
}

/// Score an extraction; degenerate views are forced to 0
pub fn score(extraction: &Extraction) -> PostureScore {
    match extraction {
        Extraction::Measured(metrics) => score_metrics(metrics),
        Extraction::Degenerate => PostureScore {
            score: 0,
            tier: ScoreTier::Poor,
            message: DEGENERATE_MESSAGE.to_string(),
            degenerate: true,
        },
    }
}
