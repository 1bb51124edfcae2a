//! Services - capture sequencing and the analysis pipeline
//!
//! - `capture` - Timed four-direction capture state machine and its async driver
//! - `extractor` - Joint map to posture metrics
//! - `scorer` - Posture metrics to a 0-100 score and message
//! - `summary` - Cross-view aggregation into findings and advice
//! - `coordinator` - Runs the pipeline for all four directions

pub mod capture;
pub mod coordinator;
pub mod extractor;
pub mod scorer;
pub mod summary;

// Re-export commonly used types
pub use capture::{CaptureCommand, CaptureDriver, CaptureOutcome, CaptureSequencer, CaptureState};
pub use coordinator::{AnalysisCoordinator, AnalysisOutcome, AnalysisSnapshot, AnalysisStatus};
pub use extractor::{extract, Extraction};
pub use scorer::{score, PostureScore, ScoreTier};
pub use summary::summarize;
