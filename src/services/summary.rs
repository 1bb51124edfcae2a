//! Cross-view session summary
//!
//! Aggregates the four directional results into an overall score, a headline,
//! and a ranked list of findings with one advice bullet each. Pure and
//! idempotent: the same results always yield the same summary.

use crate::domain::result::{DirectionalResult, Finding, SessionSummary};
use crate::domain::types::ShotDirection;
use crate::services::scorer::ScoreTier;
use smallvec::SmallVec;

/// Front/back: shoulder height difference that counts as asymmetry
pub const SHOULDER_FINDING_THRESHOLD: f64 = 0.06;
/// Front/back: hip height difference that counts as pelvis asymmetry
pub const HIP_FINDING_THRESHOLD: f64 = 0.06;
/// Front only: knee height difference that counts as asymmetry
pub const KNEE_FINDING_THRESHOLD: f64 = 0.08;
/// Side views: shoulder line tilt (degrees) that counts as a lean
pub const TORSO_FINDING_THRESHOLD_DEG: f64 = 6.0;
/// Side views: neck offset from the hip midpoint that counts as forward head
pub const HEAD_FINDING_THRESHOLD: f64 = 0.05;

const UNANALYZED_HEADLINE: &str = "Could not analyze";
const UNANALYZED_MESSAGE: &str =
    "None of the four photos could be analyzed. Check the capture conditions and try again.";
const UNANALYZED_ADVICE: [&str; 3] = [
    "Stand 2-3 meters from the camera so your whole body is in frame.",
    "Use even, bright lighting and avoid strong backlight.",
    "Keep the camera stable and level, ideally on a stand.",
];

const MAINTAIN_ADVICE: [&str; 2] = [
    "No notable imbalance found. Maintain your current habits.",
    "Keep stretching regularly and repeat this check once a month.",
];

/// Fixed finding → advice association
pub fn advice_for(finding: Finding) -> &'static str {
    match finding {
        Finding::ShoulderAsymmetry => {
            "Shoulder heights differ: avoid carrying bags on one side and stretch the upper trapezius."
        }
        Finding::PelvisAsymmetry => {
            "Pelvis is uneven: avoid crossing your legs and strengthen glutes and core evenly."
        }
        Finding::KneeAsymmetry => {
            "Knee heights differ: balance your weight on both legs and train single-leg stability."
        }
        Finding::TorsoLean => {
            "Torso leans sideways: check desk and screen height and do side-bend stretches."
        }
        Finding::ForwardHead => {
            "Head sits forward: raise your screen to eye level and practice chin tucks."
        }
    }
}

/// Findings supported by one view's metrics, in a fixed per-view order
fn view_findings(result: &DirectionalResult) -> SmallVec<[Finding; 3]> {
    let mut findings = SmallVec::new();
    let Some(metrics) = result.metrics() else {
        return findings;
    };

    match result.direction {
        ShotDirection::Front | ShotDirection::Back => {
            if metrics.shoulder_diff > SHOULDER_FINDING_THRESHOLD {
                findings.push(Finding::ShoulderAsymmetry);
            }
            if metrics.hip_diff > HIP_FINDING_THRESHOLD {
                findings.push(Finding::PelvisAsymmetry);
            }
            if result.direction == ShotDirection::Front
                && metrics.knee_diff > KNEE_FINDING_THRESHOLD
            {
                findings.push(Finding::KneeAsymmetry);
            }
        }
        ShotDirection::Right | ShotDirection::Left => {
            if metrics.torso_tilt_deg > TORSO_FINDING_THRESHOLD_DEG {
                findings.push(Finding::TorsoLean);
            }
            if metrics.head_offset_x > HEAD_FINDING_THRESHOLD {
                findings.push(Finding::ForwardHead);
            }
        }
    }
    findings
}

/// Rounded mean of the available scores; failed views are excluded
pub fn average_score(results: &[DirectionalResult]) -> Option<u8> {
    let scores: SmallVec<[u8; 4]> = results.iter().filter_map(|r| r.score()).collect();
    if scores.is_empty() {
        return None;
    }
    let sum: u32 = scores.iter().map(|&s| u32::from(s)).sum();
    let mean = (f64::from(sum) / scores.len() as f64).round();
    Some(mean.clamp(0.0, 100.0) as u8)
}

/// Build the session summary from the directional results
pub fn summarize(results: &[DirectionalResult]) -> SessionSummary {
    let Some(overall) = average_score(results) else {
        return SessionSummary {
            overall_score: None,
            headline: UNANALYZED_HEADLINE.to_string(),
            message: UNANALYZED_MESSAGE.to_string(),
            findings: Vec::new(),
            advice: UNANALYZED_ADVICE.iter().map(|s| s.to_string()).collect(),
        };
    };

    let mut ordered: SmallVec<[&DirectionalResult; 4]> = results.iter().collect();
    ordered.sort_by_key(|r| r.direction.index());

    let mut findings: Vec<Finding> = Vec::new();
    for result in ordered {
        for finding in view_findings(result) {
            if !findings.contains(&finding) {
                findings.push(finding);
            }
        }
    }

    let tier = ScoreTier::from_score(overall);
    let message = if findings.is_empty() {
        format!("Overall score {overall}. {}", tier.message())
    } else {
        let labels: Vec<&str> = findings.iter().map(|f| f.label()).collect();
        format!("Overall score {overall}. {} Noted: {}.", tier.message(), labels.join(", "))
    };

    // Zeroed metrics raise no findings, so body-not-found views need their own advice
    let all_degenerate = results.iter().filter_map(|r| r.scored()).all(|v| v.degenerate);
    let advice = if !findings.is_empty() {
        findings.iter().map(|f| advice_for(*f).to_string()).collect()
    } else if all_degenerate {
        UNANALYZED_ADVICE.iter().map(|s| s.to_string()).collect()
    } else {
        MAINTAIN_ADVICE.iter().map(|s| s.to_string()).collect()
    };

    SessionSummary {
        overall_score: Some(overall),
        headline: tier.headline().to_string(),
        message,
        findings,
        advice,
    }
}
