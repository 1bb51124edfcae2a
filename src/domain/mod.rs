//! Domain models - core posture assessment types
//!
//! This module contains the canonical data types used throughout the system:
//! - `types` - joints, directions, metrics and normalized images
//! - `result` - per-direction results, findings and the session summary

pub mod result;
pub mod types;

// Re-export commonly used types at module level
pub use result::{DirectionalResult, Finding, SessionSummary, ViewOutcome};
pub use types::{
    DirectionalImage, JointMap, JointName, JointPoint, NormalizedImage, PostureMetrics,
    ShotDirection,
};
