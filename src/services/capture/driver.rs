//! Async driver for the capture sequencer
//!
//! Owns the camera lease and the countdown ticker, feeds UI commands and
//! timer ticks into the sequencer, carries out its effects one at a time and
//! publishes a `CaptureSnapshot` after every transition.

use super::{CaptureEffect, CaptureInput, CaptureSequencer, CaptureSnapshot, CaptureState};
use crate::domain::types::DirectionalImage;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::camera::{Camera, CameraLease};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

/// Commands from the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    /// Start the countdown for the current direction
    Start,
    /// Interrupt the countdown, or end the session while waiting
    Cancel,
    /// UI torn down: end the session and release the camera
    Teardown,
}

/// Terminal result of a capture session
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// Four shots in front/right/back/left order
    Complete(Vec<DirectionalImage>),
    /// Stopped early by the user or by teardown
    Cancelled { shots_taken: usize },
    /// Camera fault; retry requires a new session
    Failed { reason: String },
}

/// Runs one capture session against a camera
pub struct CaptureDriver<C: Camera> {
    camera: Arc<C>,
    sequencer: CaptureSequencer,
    tick_period: Duration,
    state_tx: watch::Sender<CaptureSnapshot>,
    metrics: Arc<Metrics>,
}

/// Wait for the next countdown tick, or forever when no countdown is running
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl<C: Camera> CaptureDriver<C> {
    /// Create a driver and the receiver observers use to follow its state
    pub fn new(
        config: &Config,
        camera: Arc<C>,
        metrics: Arc<Metrics>,
    ) -> (Self, watch::Receiver<CaptureSnapshot>) {
        let sequencer = CaptureSequencer::new(config.countdown_secs());
        let (state_tx, state_rx) = watch::channel(sequencer.snapshot());
        let driver = Self {
            camera,
            sequencer,
            tick_period: Duration::from_millis(config.tick_ms().max(1)),
            state_tx,
            metrics,
        };
        (driver, state_rx)
    }

    fn new_ticker(&self) -> Interval {
        let mut ticker = interval_at(Instant::now() + self.tick_period, self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.sequencer.snapshot());
    }

    /// Run the session until it completes, is cancelled or fails.
    ///
    /// A closed command channel is treated as teardown. Dropping this future
    /// releases the camera through the lease.
    pub async fn run(mut self, mut commands: mpsc::Receiver<CaptureCommand>) -> CaptureOutcome {
        let mut lease = match CameraLease::acquire(self.camera.clone()).await {
            Ok(lease) => {
                self.sequencer.handle(CaptureInput::CameraReady);
                self.publish();
                Some(lease)
            }
            Err(e) => {
                self.sequencer.handle(CaptureInput::CameraFault(e.to_string()));
                self.publish();
                self.metrics.record_capture_failed();
                return CaptureOutcome::Failed { reason: e.to_string() };
            }
        };

        let mut ticker: Option<Interval> = None;
        let mut delivered: Option<Vec<DirectionalImage>> = None;

        loop {
            let input = tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(CaptureCommand::Start) => CaptureInput::Start,
                    Some(CaptureCommand::Cancel) => CaptureInput::Cancel,
                    Some(CaptureCommand::Teardown) | None => CaptureInput::Teardown,
                },
                _ = next_tick(&mut ticker) => CaptureInput::Tick,
            };

            self.dispatch(input, &mut ticker, &mut lease, &mut delivered).await;

            match self.sequencer.state() {
                CaptureState::Complete => {
                    self.metrics.record_capture_completed();
                    let shots = delivered.take().unwrap_or_else(|| self.sequencer.shots().to_vec());
                    return CaptureOutcome::Complete(shots);
                }
                CaptureState::Cancelled => {
                    self.metrics.record_capture_cancelled();
                    return CaptureOutcome::Cancelled { shots_taken: self.sequencer.shots().len() };
                }
                CaptureState::Error { reason } => {
                    self.metrics.record_capture_failed();
                    return CaptureOutcome::Failed { reason: reason.clone() };
                }
                _ => {}
            }
        }
    }

    /// Feed one input and carry out the resulting effects in order.
    /// Photo capture is awaited inline, so at most one capture is in flight.
    async fn dispatch(
        &mut self,
        input: CaptureInput,
        ticker: &mut Option<Interval>,
        lease: &mut Option<CameraLease<C>>,
        delivered: &mut Option<Vec<DirectionalImage>>,
    ) {
        let mut pending = VecDeque::from([input]);

        while let Some(input) = pending.pop_front() {
            let effects = self.sequencer.handle(input);
            self.publish();

            for effect in effects {
                match effect {
                    CaptureEffect::StartCountdown => *ticker = Some(self.new_ticker()),
                    CaptureEffect::StopCountdown => *ticker = None,
                    CaptureEffect::TakePhoto(direction) => {
                        let next = match lease.as_ref() {
                            Some(lease) => match lease.capture(direction).await {
                                Ok(bytes) => CaptureInput::ShotTaken(bytes),
                                Err(e) => CaptureInput::CameraFault(e.to_string()),
                            },
                            None => CaptureInput::CameraFault("camera not held".to_string()),
                        };
                        pending.push_back(next);
                    }
                    CaptureEffect::ReleaseCamera => {
                        if lease.take().is_some() {
                            info!("camera_released");
                        } else {
                            warn!("camera_release_without_lease");
                        }
                    }
                    CaptureEffect::Deliver(shots) => *delivered = Some(shots),
                }
            }
        }
    }
}
