//! Timed four-direction capture sequence
//!
//! `CaptureSequencer` is a pure state machine: it consumes `CaptureInput`s and
//! returns the `CaptureEffect`s the caller must carry out (start/stop the
//! countdown ticker, take a photo, release the camera, deliver the shots).
//! `CaptureDriver` layers the camera, the timer and observer notification on
//! top of it.
//!
//! State flow per direction:
//! `AwaitingUserStart → Countdown(n..1) → Capturing → AwaitingUserStart(next)`,
//! ending in `Complete` after the left shot. `Cancelled` and `Error` can be
//! reached from any non-terminal state; terminal states return to `Idle` only
//! through `Reset`.

mod driver;

pub use driver::{CaptureCommand, CaptureDriver, CaptureOutcome};

use crate::domain::types::{DirectionalImage, ShotDirection};
use bytes::Bytes;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, info, warn};

/// Sequencer state
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    AwaitingUserStart { direction: ShotDirection },
    Countdown { direction: ShotDirection, seconds_remaining: u32 },
    Capturing { direction: ShotDirection },
    Complete,
    Cancelled,
    Error { reason: String },
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::AwaitingUserStart { .. } => "awaiting_user_start",
            CaptureState::Countdown { .. } => "countdown",
            CaptureState::Capturing { .. } => "capturing",
            CaptureState::Complete => "complete",
            CaptureState::Cancelled => "cancelled",
            CaptureState::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Complete | CaptureState::Cancelled | CaptureState::Error { .. })
    }

    pub fn direction(&self) -> Option<ShotDirection> {
        match self {
            CaptureState::AwaitingUserStart { direction }
            | CaptureState::Countdown { direction, .. }
            | CaptureState::Capturing { direction } => Some(*direction),
            _ => None,
        }
    }
}

/// Inputs driving the sequencer
#[derive(Debug, Clone)]
pub enum CaptureInput {
    /// Camera session acquired and ready
    CameraReady,
    /// User pressed start for the current direction
    Start,
    /// One countdown period elapsed
    Tick,
    /// User cancel: interrupts a countdown, or ends the session while waiting
    Cancel,
    /// The photo pipeline delivered an encoded image
    ShotTaken(Bytes),
    /// Unrecoverable camera fault
    CameraFault(String),
    /// Surrounding UI is going away
    Teardown,
    /// Leave a terminal state for a fresh session
    Reset,
}

impl CaptureInput {
    fn as_str(&self) -> &'static str {
        match self {
            CaptureInput::CameraReady => "camera_ready",
            CaptureInput::Start => "start",
            CaptureInput::Tick => "tick",
            CaptureInput::Cancel => "cancel",
            CaptureInput::ShotTaken(_) => "shot_taken",
            CaptureInput::CameraFault(_) => "camera_fault",
            CaptureInput::Teardown => "teardown",
            CaptureInput::Reset => "reset",
        }
    }
}

/// Side effects requested by a transition
#[derive(Debug, Clone)]
pub enum CaptureEffect {
    StartCountdown,
    StopCountdown,
    TakePhoto(ShotDirection),
    ReleaseCamera,
    /// All four shots, tagged front/right/back/left in that order
    Deliver(Vec<DirectionalImage>),
}

pub type CaptureEffects = SmallVec<[CaptureEffect; 2]>;

/// Observable capture state for UI layers
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSnapshot {
    pub state: CaptureState,
    pub current_direction: Option<ShotDirection>,
    pub seconds_remaining: Option<u32>,
    pub is_counting_down: bool,
    pub shots_taken: usize,
    pub error: Option<String>,
}

/// Pure capture state machine
pub struct CaptureSequencer {
    state: CaptureState,
    countdown_secs: u32,
    shots: Vec<DirectionalImage>,
    /// Camera acquired and not yet released
    camera_held: bool,
}

impl CaptureSequencer {
    pub fn new(countdown_secs: u32) -> Self {
        Self {
            state: CaptureState::Idle,
            countdown_secs: countdown_secs.max(1),
            shots: Vec::with_capacity(ShotDirection::ALL.len()),
            camera_held: false,
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn shots(&self) -> &[DirectionalImage] {
        &self.shots
    }

    pub fn camera_held(&self) -> bool {
        self.camera_held
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        let (seconds_remaining, is_counting_down) = match self.state {
            CaptureState::Countdown { seconds_remaining, .. } => (Some(seconds_remaining), true),
            _ => (None, false),
        };
        let error = match &self.state {
            CaptureState::Error { reason } => Some(reason.clone()),
            _ => None,
        };
        CaptureSnapshot {
            state: self.state.clone(),
            current_direction: self.state.direction(),
            seconds_remaining,
            is_counting_down,
            shots_taken: self.shots.len(),
            error,
        }
    }

    /// Apply one input. Inputs that make no sense in the current state are
    /// ignored and leave the state untouched.
    pub fn handle(&mut self, input: CaptureInput) -> CaptureEffects {
        let input_name = input.as_str();
        let state = std::mem::replace(&mut self.state, CaptureState::Idle);

        let (next, effects) = match (state, input) {
            (CaptureState::Idle, CaptureInput::CameraReady) => {
                self.camera_held = true;
                self.shots.clear();
                info!("camera_ready");
                (CaptureState::AwaitingUserStart { direction: ShotDirection::Front }, smallvec![])
            }

            (CaptureState::AwaitingUserStart { direction }, CaptureInput::Start) => {
                info!(direction = %direction, seconds = %self.countdown_secs, "countdown_started");
                (
                    CaptureState::Countdown { direction, seconds_remaining: self.countdown_secs },
                    smallvec![CaptureEffect::StartCountdown],
                )
            }

            (CaptureState::AwaitingUserStart { .. }, CaptureInput::Cancel) => {
                info!(shots = %self.shots.len(), "capture_cancelled");
                let mut effects = CaptureEffects::new();
                self.release(&mut effects);
                (CaptureState::Cancelled, effects)
            }

            (CaptureState::Countdown { direction, seconds_remaining }, CaptureInput::Tick) => {
                let remaining = seconds_remaining.saturating_sub(1);
                if remaining == 0 {
                    debug!(direction = %direction, "countdown_finished");
                    (
                        CaptureState::Capturing { direction },
                        smallvec![CaptureEffect::StopCountdown, CaptureEffect::TakePhoto(direction)],
                    )
                } else {
                    debug!(direction = %direction, seconds_remaining = %remaining, "countdown_tick");
                    (
                        CaptureState::Countdown { direction, seconds_remaining: remaining },
                        smallvec![],
                    )
                }
            }

            (CaptureState::Countdown { direction, seconds_remaining }, CaptureInput::Cancel) => {
                info!(direction = %direction, seconds_remaining = %seconds_remaining, "countdown_cancelled");
                (
                    CaptureState::AwaitingUserStart { direction },
                    smallvec![CaptureEffect::StopCountdown],
                )
            }

            (CaptureState::Capturing { direction }, CaptureInput::ShotTaken(bytes)) => {
                info!(direction = %direction, bytes = %bytes.len(), "shot_captured");
                self.shots.push(DirectionalImage::new(direction, bytes));
                match direction.next() {
                    Some(next) => (CaptureState::AwaitingUserStart { direction: next }, smallvec![]),
                    None => {
                        let mut effects = CaptureEffects::new();
                        self.release(&mut effects);
                        effects.push(CaptureEffect::Deliver(self.shots.clone()));
                        info!(shots = %self.shots.len(), "capture_complete");
                        (CaptureState::Complete, effects)
                    }
                }
            }

            (state, CaptureInput::CameraFault(reason)) if !state.is_terminal() => {
                warn!(state = %state.as_str(), reason = %reason, "camera_fault");
                let mut effects = CaptureEffects::new();
                if matches!(state, CaptureState::Countdown { .. }) {
                    effects.push(CaptureEffect::StopCountdown);
                }
                self.release(&mut effects);
                (CaptureState::Error { reason }, effects)
            }

            (state, CaptureInput::Teardown) if !state.is_terminal() => {
                info!(state = %state.as_str(), shots = %self.shots.len(), "capture_torn_down");
                let mut effects = CaptureEffects::new();
                if matches!(state, CaptureState::Countdown { .. }) {
                    effects.push(CaptureEffect::StopCountdown);
                }
                self.release(&mut effects);
                (CaptureState::Cancelled, effects)
            }

            (state, CaptureInput::Reset) if state.is_terminal() => {
                debug!(from = %state.as_str(), "capture_reset");
                self.shots.clear();
                (CaptureState::Idle, smallvec![])
            }

            (state, _) => {
                debug!(state = %state.as_str(), input = %input_name, "capture_input_ignored");
                (state, smallvec![])
            }
        };

        self.state = next;
        effects
    }

    /// Queue a camera release exactly once per acquisition
    fn release(&mut self, effects: &mut CaptureEffects) {
        if self.camera_held {
            self.camera_held = false;
            effects.push(CaptureEffect::ReleaseCamera);
        }
    }
}
