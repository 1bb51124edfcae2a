//! Four-direction analysis pipeline
//!
//! Each direction runs decode → detect → extract → score → overlay on a
//! blocking worker, one direction at a time in canonical order. Failures are
//! contained to their direction. Observers follow progress through a `watch`
//! channel that receives a fresh snapshot after every direction.
//!
//! Cancellation is checked between directions: a running detection finishes,
//! no further direction starts, and the session ends `Incomplete` without a
//! summary or a completion event.

use crate::domain::result::{DirectionalResult, ScoredView, SessionSummary, ViewOutcome};
use crate::domain::types::{new_uuid_v7, DirectionalImage, NormalizedImage, ShotDirection};
use crate::error::{AnalysisError, DetectionError};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::events::{EventSender, SessionRecord};
use crate::io::keypoints::KeypointProvider;
use crate::io::skeleton::SkeletonRenderer;
use crate::services::extractor::extract;
use crate::services::scorer::score;
use crate::services::summary::summarize;
use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

/// How an analysis session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    Complete,
    /// Cancelled after `processed` directions
    Incomplete { processed: usize },
}

/// Observable coordinator state
#[derive(Debug, Clone)]
pub struct AnalysisSnapshot {
    /// Always four entries in front/right/back/left order once a session starts
    pub items: Vec<DirectionalResult>,
    pub summary: Option<SessionSummary>,
    pub is_loading: bool,
    pub status: Option<AnalysisStatus>,
}

impl AnalysisSnapshot {
    fn idle() -> Self {
        Self { items: Vec::new(), summary: None, is_loading: false, status: None }
    }
}

/// Final result of `AnalysisCoordinator::start`
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub session_id: String,
    pub items: Vec<DirectionalResult>,
    /// Present only when every direction was processed
    pub summary: Option<SessionSummary>,
    pub status: AnalysisStatus,
}

/// Per-direction work product of a blocking worker
struct ViewAnalysis {
    preview: Option<Arc<RgbaImage>>,
    skeleton: Option<Arc<RgbaImage>>,
    outcome: ViewOutcome,
    detect_ms: Option<u64>,
}

impl ViewAnalysis {
    fn failed(preview: Option<Arc<RgbaImage>>, error: String) -> Self {
        Self { preview, skeleton: None, outcome: ViewOutcome::Failed { error }, detect_ms: None }
    }
}

/// Analyze one encoded photo. Runs on a blocking thread.
fn analyze_view<P: KeypointProvider>(
    provider: &P,
    renderer: &SkeletonRenderer,
    bytes: &[u8],
    max_dimension: u32,
    min_confidence: f64,
) -> ViewAnalysis {
    let image = match NormalizedImage::from_encoded(bytes, max_dimension) {
        Ok(image) => image,
        Err(e) => return ViewAnalysis::failed(None, DetectionError::Decode(e).to_string()),
    };
    let preview = Arc::new(image.pixels().clone());

    let detect_start = Instant::now();
    let joints = match provider.detect(&image) {
        Ok(joints) => joints,
        Err(e) => return ViewAnalysis::failed(Some(preview), e.to_string()),
    };
    let detect_ms = detect_start.elapsed().as_millis() as u64;

    let extraction = extract(&joints, min_confidence);
    let result = score(&extraction);
    let skeleton = renderer.render(image.pixels(), &joints);

    ViewAnalysis {
        preview: Some(preview),
        skeleton: Some(Arc::new(skeleton)),
        outcome: ViewOutcome::Scored(ScoredView {
            score: result.score,
            message: result.message,
            metrics: extraction.metrics(),
            degenerate: result.degenerate,
        }),
        detect_ms: Some(detect_ms),
    }
}

/// Reject anything but exactly one shot per direction; returns canonical order
fn canonical_shots(mut shots: Vec<DirectionalImage>) -> Result<Vec<DirectionalImage>, AnalysisError> {
    let mut seen = [false; 4];
    for shot in &shots {
        let slot = &mut seen[shot.direction.index()];
        if *slot {
            return Err(AnalysisError::InvalidShotSet(format!(
                "duplicate {} shot",
                shot.direction
            )));
        }
        *slot = true;
    }
    if let Some(missing) = ShotDirection::ALL.iter().find(|d| !seen[d.index()]) {
        return Err(AnalysisError::InvalidShotSet(format!("missing {missing} shot")));
    }
    shots.sort_by_key(|s| s.direction.index());
    Ok(shots)
}

/// Runs analysis sessions against a keypoint provider
pub struct AnalysisCoordinator<P: KeypointProvider> {
    provider: Arc<P>,
    renderer: SkeletonRenderer,
    max_dimension: u32,
    min_confidence: f64,
    metrics: Arc<Metrics>,
    events: Option<EventSender>,
    state_tx: watch::Sender<AnalysisSnapshot>,
}

impl<P: KeypointProvider> AnalysisCoordinator<P> {
    pub fn new(
        config: &Config,
        provider: Arc<P>,
        metrics: Arc<Metrics>,
    ) -> (Self, watch::Receiver<AnalysisSnapshot>) {
        let (state_tx, state_rx) = watch::channel(AnalysisSnapshot::idle());
        let coordinator = Self {
            provider,
            renderer: SkeletonRenderer::new(config.min_joint_confidence()),
            max_dimension: config.max_dimension(),
            min_confidence: config.min_joint_confidence(),
            metrics,
            events: None,
            state_tx,
        };
        (coordinator, state_rx)
    }

    /// Publish completion events to collaborators
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Another observer of the coordinator state
    pub fn subscribe(&self) -> watch::Receiver<AnalysisSnapshot> {
        self.state_tx.subscribe()
    }

    fn publish(&self, snapshot: AnalysisSnapshot) {
        self.state_tx.send_replace(snapshot);
    }

    /// Analyze a full shot set.
    ///
    /// Fails only when the shot set is not exactly one image per direction;
    /// detection problems end up in the affected item. Setting `cancel` to
    /// true stops the session before the next direction starts.
    pub async fn start(
        &self,
        shots: Vec<DirectionalImage>,
        cancel: watch::Receiver<bool>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let shots = canonical_shots(shots)?;
        let session_id = new_uuid_v7();
        self.metrics.record_session_started();
        info!(session_id = %session_id, "analysis_started");

        let mut items: Vec<DirectionalResult> = shots
            .iter()
            .map(|s| DirectionalResult::pending(s.direction, s.bytes.clone()))
            .collect();
        self.publish(AnalysisSnapshot {
            items: items.clone(),
            summary: None,
            is_loading: true,
            status: None,
        });

        let mut processed = 0;
        for (idx, shot) in shots.iter().enumerate() {
            if *cancel.borrow() {
                break;
            }

            let provider = self.provider.clone();
            let renderer = self.renderer.clone();
            let bytes = shot.bytes.clone();
            let (max_dimension, min_confidence) = (self.max_dimension, self.min_confidence);
            let analysis = tokio::task::spawn_blocking(move || {
                analyze_view(provider.as_ref(), &renderer, &bytes, max_dimension, min_confidence)
            })
            .await
            .unwrap_or_else(|e| ViewAnalysis::failed(None, AnalysisError::Worker(e.to_string()).to_string()));

            self.record_view(&session_id, shot.direction, &analysis);
            let item = &mut items[idx];
            item.preview = analysis.preview;
            item.skeleton = analysis.skeleton;
            item.outcome = analysis.outcome;
            processed += 1;

            self.publish(AnalysisSnapshot {
                items: items.clone(),
                summary: None,
                is_loading: true,
                status: None,
            });
        }

        if processed < items.len() {
            let status = AnalysisStatus::Incomplete { processed };
            self.metrics.record_session_cancelled();
            info!(session_id = %session_id, processed = %processed, "analysis_cancelled");
            self.publish(AnalysisSnapshot {
                items: items.clone(),
                summary: None,
                is_loading: false,
                status: Some(status),
            });
            return Ok(AnalysisOutcome { session_id, items, summary: None, status });
        }

        let summary = summarize(&items);
        self.metrics.record_session_completed();
        info!(
            session_id = %session_id,
            overall_score = ?summary.overall_score,
            findings = %summary.findings.len(),
            "analysis_completed"
        );

        if let Some(events) = &self.events {
            events.send_completed(SessionRecord::new(session_id.clone(), &items, &summary));
        }

        let status = AnalysisStatus::Complete;
        self.publish(AnalysisSnapshot {
            items: items.clone(),
            summary: Some(summary.clone()),
            is_loading: false,
            status: Some(status),
        });
        Ok(AnalysisOutcome { session_id, items, summary: Some(summary), status })
    }

    fn record_view(&self, session_id: &str, direction: ShotDirection, analysis: &ViewAnalysis) {
        if let Some(ms) = analysis.detect_ms {
            self.metrics.record_detect_latency(ms);
        }
        match &analysis.outcome {
            ViewOutcome::Scored(view) => {
                self.metrics.record_view_scored(view.degenerate);
                info!(
                    session_id = %session_id,
                    direction = %direction,
                    score = %view.score,
                    degenerate = %view.degenerate,
                    "view_scored"
                );
            }
            ViewOutcome::Failed { error } => {
                self.metrics.record_view_failed();
                warn!(session_id = %session_id, direction = %direction, error = %error, "view_failed");
            }
            ViewOutcome::Pending => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{JointMap, JointName};
    use crate::io::events::{create_event_channel, AnalysisEvent};
    use bytes::Bytes;
    use image::{DynamicImage, ImageFormat};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// PNG whose width identifies the direction: 10, 11, 12, 13 pixels
    fn shot(direction: ShotDirection) -> DirectionalImage {
        let image = DynamicImage::new_rgba8(10 + direction.index() as u32, 10);
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        DirectionalImage::new(direction, Bytes::from(buf.into_inner()))
    }

    fn all_shots() -> Vec<DirectionalImage> {
        ShotDirection::ALL.iter().map(|d| shot(*d)).collect()
    }

    fn upright_joints() -> JointMap {
        JointMap::new()
            .with(JointName::Neck, 0.5, 0.8, 0.9)
            .with(JointName::LeftShoulder, 0.4, 0.7, 0.9)
            .with(JointName::RightShoulder, 0.6, 0.7, 0.9)
            .with(JointName::LeftHip, 0.45, 0.4, 0.9)
            .with(JointName::RightHip, 0.55, 0.4, 0.9)
    }

    /// Provider returning upright joints, failing for chosen image widths
    #[derive(Default)]
    struct FakeProvider {
        fail_widths: Vec<u32>,
        calls: AtomicUsize,
        cancel_after: Option<(usize, Arc<watch::Sender<bool>>)>,
    }

    impl KeypointProvider for FakeProvider {
        fn detect(&self, image: &NormalizedImage) -> Result<JointMap, DetectionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((after, tx)) = &self.cancel_after {
                if n == *after {
                    tx.send_replace(true);
                }
            }
            if self.fail_widths.contains(&image.width()) {
                return Err(DetectionError::NoPerson);
            }
            Ok(upright_joints())
        }
    }

    fn coordinator(
        provider: FakeProvider,
    ) -> (AnalysisCoordinator<FakeProvider>, watch::Receiver<AnalysisSnapshot>, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let (c, rx) = AnalysisCoordinator::new(&Config::default(), Arc::new(provider), metrics.clone());
        (c, rx, metrics)
    }

    fn never_cancel() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn test_full_session_completes() {
        let (c, rx, metrics) = coordinator(FakeProvider::default());
        let outcome = c.start(all_shots(), never_cancel()).await.unwrap();

        assert_eq!(outcome.status, AnalysisStatus::Complete);
        assert!(outcome.items.iter().all(|i| i.score() == Some(100)));
        assert!(outcome.items.iter().all(|i| i.skeleton.is_some() && i.preview.is_some()));
        assert_eq!(outcome.summary.as_ref().and_then(|s| s.overall_score), Some(100));

        let snap = rx.borrow().clone();
        assert!(!snap.is_loading);
        assert_eq!(snap.status, Some(AnalysisStatus::Complete));
        assert!(snap.summary.is_some());
        assert_eq!(metrics.report().sessions_completed, 1);
    }

    #[tokio::test]
    async fn test_items_in_canonical_order() {
        let (c, _rx, _) = coordinator(FakeProvider::default());
        let mut shots = all_shots();
        shots.reverse();
        let outcome = c.start(shots, never_cancel()).await.unwrap();
        let directions: Vec<_> = outcome.items.iter().map(|i| i.direction).collect();
        assert_eq!(directions, ShotDirection::ALL.to_vec());
        // Preview of the back shot is the 12-pixel-wide image
        assert_eq!(outcome.items[2].preview.as_ref().map(|p| p.width()), Some(12));
    }

    #[tokio::test]
    async fn test_failure_contained_to_direction() {
        let (c, _rx, metrics) = coordinator(FakeProvider { fail_widths: vec![11], ..Default::default() });
        let outcome = c.start(all_shots(), never_cancel()).await.unwrap();

        assert_eq!(outcome.status, AnalysisStatus::Complete);
        let right = &outcome.items[1];
        assert_eq!(right.error(), Some("No person detected"));
        assert!(right.preview.is_some());
        assert!(right.skeleton.is_none());
        assert_eq!(outcome.items.iter().filter(|i| i.score() == Some(100)).count(), 3);
        assert_eq!(metrics.views_failed(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_photo_fails_view() {
        let (c, _rx, _) = coordinator(FakeProvider::default());
        let mut shots = all_shots();
        shots[3] = DirectionalImage::new(ShotDirection::Left, Bytes::from_static(b"garbage"));
        let outcome = c.start(shots, never_cancel()).await.unwrap();
        let left = &outcome.items[3];
        assert!(left.error().is_some());
        assert!(left.preview.is_none());
        assert_eq!(outcome.summary.and_then(|s| s.overall_score), Some(100));
    }

    #[tokio::test]
    async fn test_invalid_shot_sets_rejected() {
        let (c, rx, metrics) = coordinator(FakeProvider::default());

        let mut three = all_shots();
        three.pop();
        let err = c.start(three, never_cancel()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidShotSet(ref m) if m.contains("left")));

        let mut dup = all_shots();
        dup[3] = shot(ShotDirection::Front);
        assert!(matches!(
            c.start(dup, never_cancel()).await,
            Err(AnalysisError::InvalidShotSet(_))
        ));

        // Nothing started
        assert!(rx.borrow().items.is_empty());
        assert_eq!(metrics.report().sessions_started, 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_direction() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);
        let provider = FakeProvider { cancel_after: Some((1, cancel_tx.clone())), ..Default::default() };
        let metrics = Arc::new(Metrics::new());
        let (events, mut events_rx) = create_event_channel(4, metrics.clone());
        let (c, rx) = AnalysisCoordinator::new(&Config::default(), Arc::new(provider), metrics.clone());
        let c = c.with_events(events);

        let outcome = c.start(all_shots(), cancel_rx).await.unwrap();

        assert_eq!(outcome.status, AnalysisStatus::Incomplete { processed: 1 });
        assert!(outcome.summary.is_none());
        assert_eq!(outcome.items[0].score(), Some(100));
        assert!(outcome.items[1..].iter().all(|i| i.is_pending()));
        assert_eq!(c.provider.calls.load(Ordering::SeqCst), 1);

        let snap = rx.borrow().clone();
        assert!(!snap.is_loading);
        assert!(snap.summary.is_none());
        assert!(events_rx.try_recv().is_err());
        assert_eq!(metrics.report().sessions_cancelled, 1);
    }

    #[tokio::test]
    async fn test_completion_event_emitted() {
        let metrics = Arc::new(Metrics::new());
        let (events, mut events_rx) = create_event_channel(4, metrics.clone());
        let (c, _rx) =
            AnalysisCoordinator::new(&Config::default(), Arc::new(FakeProvider::default()), metrics);
        let c = c.with_events(events);

        let outcome = c.start(all_shots(), never_cancel()).await.unwrap();
        let AnalysisEvent::Completed(record) = events_rx.recv().await.unwrap();
        assert_eq!(record.session_id, outcome.session_id);
        assert_eq!(record.overall_score, Some(100));
        assert_eq!(record.scores.len(), 4);
    }

    /// Tracks how many detections overlap
    #[derive(Default)]
    struct OverlapProvider {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl KeypointProvider for OverlapProvider {
        fn detect(&self, _image: &NormalizedImage) -> Result<JointMap, DetectionError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(upright_joints())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_detection_in_flight() {
        let provider = Arc::new(OverlapProvider::default());
        let (c, _rx) =
            AnalysisCoordinator::new(&Config::default(), provider.clone(), Arc::new(Metrics::new()));
        let outcome = c.start(all_shots(), never_cancel()).await.unwrap();

        assert_eq!(outcome.status, AnalysisStatus::Complete);
        assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(provider.in_flight.load(Ordering::SeqCst), 0);
    }

    /// Blocks each detection until the test hands out a permit
    struct GatedProvider {
        permits: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl KeypointProvider for GatedProvider {
        fn detect(&self, _image: &NormalizedImage) -> Result<JointMap, DetectionError> {
            let permits = self
                .permits
                .lock()
                .map_err(|_| DetectionError::Provider("gate poisoned".to_string()))?;
            permits
                .recv()
                .map_err(|_| DetectionError::Provider("gate closed".to_string()))?;
            Ok(upright_joints())
        }
    }

    #[tokio::test]
    async fn test_progress_visible_between_directions() {
        let (permit_tx, permit_rx) = std::sync::mpsc::channel();
        let provider = GatedProvider { permits: std::sync::Mutex::new(permit_rx) };
        let (c, mut rx) =
            AnalysisCoordinator::new(&Config::default(), Arc::new(provider), Arc::new(Metrics::new()));
        let session = tokio::spawn(async move { c.start(all_shots(), never_cancel()).await });

        permit_tx.send(()).unwrap();
        let snap = rx
            .wait_for(|s| s.items.iter().any(|i| !i.is_pending()))
            .await
            .unwrap()
            .clone();
        // Front done, the rest still waiting on the gate
        assert!(snap.is_loading);
        assert!(snap.status.is_none());
        assert!(snap.summary.is_none());
        assert_eq!(snap.items[0].score(), Some(100));
        assert!(snap.items[1..].iter().all(|i| i.is_pending()));

        for _ in 1..ShotDirection::ALL.len() {
            permit_tx.send(()).unwrap();
        }
        let outcome = session.await.unwrap().unwrap();
        assert_eq!(outcome.status, AnalysisStatus::Complete);
        let last = rx.borrow().clone();
        assert!(!last.is_loading);
        assert!(last.items.iter().all(|i| i.score() == Some(100)));
    }

    #[tokio::test]
    async fn test_snapshot_published_per_direction() {
        let (c, mut rx, _) = coordinator(FakeProvider::default());
        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let snap = rx.borrow_and_update().clone();
                let done = snap.items.iter().filter(|i| !i.is_pending()).count();
                seen.push((done, snap.is_loading));
                if snap.status.is_some() {
                    break;
                }
            }
            seen
        });
        // Give the watcher a chance to subscribe before any change
        tokio::task::yield_now().await;
        c.start(all_shots(), never_cancel()).await.unwrap();
        let seen = watcher.await.unwrap();
        assert_eq!(seen.last(), Some(&(4, false)));
        assert!(seen.iter().all(|(done, _)| *done <= 4));
    }
}
