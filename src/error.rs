//! Error types for capture, detection, analysis and report composition
//!
//! Cancellation is deliberately absent: a cancelled capture or analysis is an
//! outcome (`CaptureOutcome::Cancelled`, `AnalysisStatus::Incomplete`), not a
//! failure.

use crate::domain::types::ShotDirection;
use thiserror::Error;

/// Keypoint provider failed outright for one image
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),

    #[error("No person detected")]
    NoPerson,

    #[error("Detector failed: {0}")]
    Provider(String),

    #[error("Detector output invalid: {0}")]
    InvalidOutput(String),

    #[error("Detector I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Camera device faults; all are fatal for the capture session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    #[error("Capture failed for {direction}: {reason}")]
    CaptureFailed { direction: ShotDirection, reason: String },
}

/// Errors that prevent an analysis session from starting or running
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Expected exactly one shot per direction: {0}")]
    InvalidShotSet(String),

    #[error("Analysis worker failed: {0}")]
    Worker(String),
}

/// Report layout or encoding failed
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("Canvas {width}x{height} is too small for the report layout")]
    CanvasTooSmall { width: u32, height: u32 },

    #[error("Font could not be loaded: {0}")]
    Font(String),

    #[error("Report image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Report I/O error: {0}")]
    Io(#[from] std::io::Error),
}
