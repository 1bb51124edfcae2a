//! IO modules - external capabilities and sinks
//!
//! - `camera` - Camera device interface and the directory-backed simulator camera
//! - `keypoints` - Keypoint detector seam and the external-program adapter
//! - `skeleton` - Skeleton overlay rendering
//! - `report` - Report image composition and text sidecar
//! - `events` - Typed channel for analysis completion events
//! - `history` - Completed sessions to file (JSONL format)

pub mod camera;
pub mod events;
pub mod history;
pub mod keypoints;
pub mod report;
pub mod skeleton;

// Re-export commonly used types
pub use camera::{Camera, CameraLease, DirectoryCamera};
pub use events::{create_event_channel, AnalysisEvent, EventSender, SessionRecord};
pub use history::HistoryWriter;
pub use keypoints::{CommandKeypointProvider, KeypointProvider};
pub use report::{Report, ReportComposer};
pub use skeleton::SkeletonRenderer;
