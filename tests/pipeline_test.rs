//! End-to-end analysis pipeline: shots → coordinator → summary → report → history

use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use posture_check::domain::{DirectionalImage, Finding, JointMap, JointName, NormalizedImage, ShotDirection};
use posture_check::error::DetectionError;
use posture_check::infra::{Config, Metrics};
use posture_check::io::{
    create_event_channel, HistoryWriter, KeypointProvider, ReportComposer, SessionRecord,
};
use posture_check::services::{AnalysisCoordinator, AnalysisStatus};
use rustc_hash::FxHashMap;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::sync::watch;

/// PNG whose width encodes the direction (10..=13 px)
fn shot(direction: ShotDirection) -> DirectionalImage {
    let image = DynamicImage::new_rgb8(10 + direction.index() as u32, 16);
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    DirectionalImage::new(direction, Bytes::from(buf.into_inner()))
}

fn shots() -> Vec<DirectionalImage> {
    ShotDirection::ALL.iter().map(|d| shot(*d)).collect()
}

/// Level shoulders, centered neck; hip and knee asymmetry as given
fn body(hip_diff: f64, knee_diff: f64) -> JointMap {
    JointMap::new()
        .with(JointName::Neck, 0.5, 0.8, 0.95)
        .with(JointName::LeftShoulder, 0.4, 0.7, 0.95)
        .with(JointName::RightShoulder, 0.6, 0.7, 0.95)
        .with(JointName::LeftHip, 0.45, 0.4 + hip_diff, 0.95)
        .with(JointName::RightHip, 0.55, 0.4, 0.95)
        .with(JointName::LeftKnee, 0.45, 0.2 + knee_diff, 0.95)
        .with(JointName::RightKnee, 0.55, 0.2, 0.95)
}

/// Detector answers keyed by image width
struct ScriptedProvider {
    answers: FxHashMap<u32, Result<JointMap, &'static str>>,
}

impl ScriptedProvider {
    fn new(answers: [Result<JointMap, &'static str>; 4]) -> Self {
        let answers = ShotDirection::ALL
            .iter()
            .zip(answers)
            .map(|(d, a)| (10 + d.index() as u32, a))
            .collect();
        Self { answers }
    }
}

impl KeypointProvider for ScriptedProvider {
    fn detect(&self, image: &NormalizedImage) -> Result<JointMap, DetectionError> {
        match self.answers.get(&image.width()) {
            Some(Ok(joints)) => Ok(joints.clone()),
            Some(Err(msg)) => Err(DetectionError::Provider(msg.to_string())),
            None => Err(DetectionError::NoPerson),
        }
    }
}

fn no_cancel() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test]
async fn test_upright_person_scores_100_everywhere() {
    let provider = ScriptedProvider::new([Ok(body(0.0, 0.0)), Ok(body(0.0, 0.0)), Ok(body(0.0, 0.0)), Ok(body(0.0, 0.0))]);
    let (coordinator, _rx) =
        AnalysisCoordinator::new(&Config::default(), Arc::new(provider), Arc::new(Metrics::new()));

    let outcome = coordinator.start(shots(), no_cancel()).await.unwrap();
    let summary = outcome.summary.unwrap();
    assert_eq!(summary.overall_score, Some(100));
    assert_eq!(summary.headline, "Very good");
    assert!(summary.findings.is_empty());
    for item in &outcome.items {
        let metrics = item.metrics().unwrap();
        assert_eq!(metrics.torso_tilt_deg, 0.0);
        assert_eq!(metrics.head_offset_x, 0.0);
    }
}

#[tokio::test]
async fn test_partial_failure_averages_remaining_views() {
    // 80, 90, error, 70
    let provider = ScriptedProvider::new([
        Ok(body(0.10, 0.0)),
        Ok(body(0.05, 0.0)),
        Err("model crashed"),
        Ok(body(0.10, 0.08)),
    ]);
    let metrics = Arc::new(Metrics::new());
    let (coordinator, _rx) =
        AnalysisCoordinator::new(&Config::default(), Arc::new(provider), metrics.clone());

    let outcome = coordinator.start(shots(), no_cancel()).await.unwrap();
    let scores: Vec<_> = outcome.items.iter().map(|i| i.score()).collect();
    assert_eq!(scores, vec![Some(80), Some(90), None, Some(70)]);
    assert_eq!(outcome.items[2].error(), Some("Detector failed: model crashed"));

    let summary = outcome.summary.unwrap();
    assert_eq!(summary.overall_score, Some(80));
    assert_eq!(summary.headline, "Generally good");
    // Front hips 0.10 apart; the knee gap on the left view is not a front finding
    assert_eq!(summary.findings, vec![Finding::PelvisAsymmetry]);
    assert_eq!(metrics.views_failed(), 1);
}

#[tokio::test]
async fn test_missing_hips_is_degenerate_zero() {
    let no_hips = JointMap::new()
        .with(JointName::LeftShoulder, 0.4, 0.7, 0.9)
        .with(JointName::RightShoulder, 0.6, 0.7, 0.9);
    let provider =
        ScriptedProvider::new([Ok(body(0.0, 0.0)), Ok(no_hips), Ok(body(0.0, 0.0)), Ok(body(0.0, 0.0))]);
    let (coordinator, _rx) =
        AnalysisCoordinator::new(&Config::default(), Arc::new(provider), Arc::new(Metrics::new()));

    let outcome = coordinator.start(shots(), no_cancel()).await.unwrap();
    let right = &outcome.items[1];
    assert_eq!(right.score(), Some(0));
    assert!(right.scored().unwrap().degenerate);
    assert!(right.message().unwrap().contains("recapture"));
    assert_eq!(outcome.summary.unwrap().overall_score, Some(75));
}

#[tokio::test]
async fn test_all_views_failed_is_unanalyzed() {
    let provider = ScriptedProvider::new([Err("a"), Err("b"), Err("c"), Err("d")]);
    let (coordinator, _rx) =
        AnalysisCoordinator::new(&Config::default(), Arc::new(provider), Arc::new(Metrics::new()));

    let outcome = coordinator.start(shots(), no_cancel()).await.unwrap();
    assert_eq!(outcome.status, AnalysisStatus::Complete);
    let summary = outcome.summary.unwrap();
    assert_eq!(summary.overall_score, None);
    assert_eq!(summary.advice.len(), 3);
}

#[tokio::test]
async fn test_cancelled_before_start_processes_nothing() {
    let provider = ScriptedProvider::new([Ok(body(0.0, 0.0)), Ok(body(0.0, 0.0)), Ok(body(0.0, 0.0)), Ok(body(0.0, 0.0))]);
    let (coordinator, rx) =
        AnalysisCoordinator::new(&Config::default(), Arc::new(provider), Arc::new(Metrics::new()));
    let (cancel_tx, cancel_rx) = watch::channel(false);
    cancel_tx.send_replace(true);

    let outcome = coordinator.start(shots(), cancel_rx).await.unwrap();
    assert_eq!(outcome.status, AnalysisStatus::Incomplete { processed: 0 });
    assert!(outcome.items.iter().all(|i| i.is_pending()));
    assert_eq!(rx.borrow().status, Some(AnalysisStatus::Incomplete { processed: 0 }));
}

#[tokio::test]
async fn test_report_and_history_written() {
    let dir = tempdir().unwrap();
    let history_path = dir.path().join("history.jsonl");
    let report_path = dir.path().join("report.png");

    let provider = ScriptedProvider::new([
        Ok(body(0.10, 0.0)),
        Ok(body(0.05, 0.0)),
        Err("model crashed"),
        Ok(body(0.10, 0.08)),
    ]);
    let metrics = Arc::new(Metrics::new());
    let (events, events_rx) = create_event_channel(4, metrics.clone());
    let writer = tokio::spawn(HistoryWriter::new(history_path.to_str().unwrap()).run(events_rx));

    let (coordinator, _rx) =
        AnalysisCoordinator::new(&Config::default(), Arc::new(provider), metrics.clone());
    let coordinator = coordinator.with_events(events);
    let outcome = coordinator.start(shots(), no_cancel()).await.unwrap();
    drop(coordinator);
    assert_eq!(writer.await.unwrap(), 1);

    let content = std::fs::read_to_string(&history_path).unwrap();
    let record: SessionRecord = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(record.session_id, outcome.session_id);
    assert_eq!(record.overall_score, Some(80));
    assert_eq!(record.scores[2].error.as_deref(), Some("Detector failed: model crashed"));

    let summary = outcome.summary.as_ref().unwrap();
    let report = ReportComposer::from_config(&Config::default())
        .unwrap()
        .compose(&outcome.items, summary)
        .unwrap();
    assert_eq!(report.image.dimensions(), (1080, 1920));
    let sidecar = report.save(&report_path).unwrap();

    let text = std::fs::read_to_string(sidecar).unwrap();
    assert!(text.contains("Overall: 80 (Generally good)"));
    assert!(text.contains("front: 80 - "));
    assert!(text.contains("right: 90 - "));
    assert!(text.contains("back: failed - Detector failed: model crashed"));
    assert!(text.contains("left: 70 - "));
    assert!(text.contains("- pelvis asymmetry"));
    assert!(image::open(&report_path).is_ok());
}
