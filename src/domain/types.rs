//! Shared types for posture capture and analysis
//!
//! Coordinate convention: joint positions are normalized to [0, 1] with the
//! origin at the bottom-left corner of the image and y growing upward. Every
//! threshold in the extractor, scorer and summary assumes this convention;
//! the skeleton renderer flips y when mapping to pixels.

use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader, ImageResult, RgbaImage};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// One of the four capture orientations of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotDirection {
    Front,
    Right,
    Back,
    Left,
}

impl ShotDirection {
    /// Canonical capture, processing and display order
    pub const ALL: [ShotDirection; 4] =
        [ShotDirection::Front, ShotDirection::Right, ShotDirection::Back, ShotDirection::Left];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotDirection::Front => "front",
            ShotDirection::Right => "right",
            ShotDirection::Back => "back",
            ShotDirection::Left => "left",
        }
    }

    /// Position in the canonical order (front=0 .. left=3)
    #[inline]
    pub fn index(&self) -> usize {
        match self {
            ShotDirection::Front => 0,
            ShotDirection::Right => 1,
            ShotDirection::Back => 2,
            ShotDirection::Left => 3,
        }
    }

    /// Next direction in capture order, None after Left
    pub fn next(&self) -> Option<ShotDirection> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Side views (right/left) measure lean rather than left/right symmetry
    pub fn is_side(&self) -> bool {
        matches!(self, ShotDirection::Right | ShotDirection::Left)
    }

    pub fn parse(s: &str) -> Option<ShotDirection> {
        Self::ALL.into_iter().find(|d| d.as_str().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for ShotDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named skeletal joint reported by the keypoint detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointName {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    Neck,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    Root,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl JointName {
    pub const ALL: [JointName; 19] = [
        JointName::Nose,
        JointName::LeftEye,
        JointName::RightEye,
        JointName::LeftEar,
        JointName::RightEar,
        JointName::Neck,
        JointName::LeftShoulder,
        JointName::RightShoulder,
        JointName::LeftElbow,
        JointName::RightElbow,
        JointName::LeftWrist,
        JointName::RightWrist,
        JointName::Root,
        JointName::LeftHip,
        JointName::RightHip,
        JointName::LeftKnee,
        JointName::RightKnee,
        JointName::LeftAnkle,
        JointName::RightAnkle,
    ];

    pub fn parse(s: &str) -> Option<JointName> {
        Self::ALL.into_iter().find(|j| j.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JointName::Nose => "nose",
            JointName::LeftEye => "left_eye",
            JointName::RightEye => "right_eye",
            JointName::LeftEar => "left_ear",
            JointName::RightEar => "right_ear",
            JointName::Neck => "neck",
            JointName::LeftShoulder => "left_shoulder",
            JointName::RightShoulder => "right_shoulder",
            JointName::LeftElbow => "left_elbow",
            JointName::RightElbow => "right_elbow",
            JointName::LeftWrist => "left_wrist",
            JointName::RightWrist => "right_wrist",
            JointName::Root => "root",
            JointName::LeftHip => "left_hip",
            JointName::RightHip => "right_hip",
            JointName::LeftKnee => "left_knee",
            JointName::RightKnee => "right_knee",
            JointName::LeftAnkle => "left_ankle",
            JointName::RightAnkle => "right_ankle",
        }
    }
}

impl std::fmt::Display for JointName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected joint position with detector confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointPoint {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

impl JointPoint {
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }
}

/// Sparse joint map for a single image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointMap {
    joints: FxHashMap<JointName, JointPoint>,
}

impl JointMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: JointName, point: JointPoint) {
        self.joints.insert(name, point);
    }

    /// Builder-style insert, mostly for fixtures
    pub fn with(mut self, name: JointName, x: f64, y: f64, confidence: f64) -> Self {
        self.insert(name, JointPoint::new(x, y, confidence));
        self
    }

    pub fn get(&self, name: JointName) -> Option<&JointPoint> {
        self.joints.get(&name)
    }

    /// Joint lookup that treats low-confidence detections as absent
    #[inline]
    pub fn confident(&self, name: JointName, min_confidence: f64) -> Option<&JointPoint> {
        self.joints.get(&name).filter(|p| p.confidence >= min_confidence)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointName, &JointPoint)> {
        self.joints.iter().map(|(name, point)| (*name, point))
    }
}

impl FromIterator<(JointName, JointPoint)> for JointMap {
    fn from_iter<I: IntoIterator<Item = (JointName, JointPoint)>>(iter: I) -> Self {
        Self { joints: iter.into_iter().collect() }
    }
}

/// Asymmetry and tilt metrics for one image, in normalized image space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PostureMetrics {
    pub shoulder_diff: f64,
    pub hip_diff: f64,
    pub torso_tilt_deg: f64,
    pub head_offset_x: f64,
    pub knee_diff: f64,
    pub ankle_diff: f64,
}

impl PostureMetrics {
    pub const ZERO: PostureMetrics = PostureMetrics {
        shoulder_diff: 0.0,
        hip_diff: 0.0,
        torso_tilt_deg: 0.0,
        head_offset_x: 0.0,
        knee_diff: 0.0,
        ankle_diff: 0.0,
    };
}

/// A captured photo tagged with its direction
#[derive(Debug, Clone)]
pub struct DirectionalImage {
    pub direction: ShotDirection,
    /// Encoded photo (JPEG/PNG) as delivered by the camera
    pub bytes: Bytes,
    pub captured_at_ms: u64,
}

impl DirectionalImage {
    pub fn new(direction: ShotDirection, bytes: Bytes) -> Self {
        Self { direction, bytes, captured_at_ms: epoch_ms() }
    }
}

/// An upright raster bounded to a maximum dimension.
///
/// All geometry (detection, metrics, skeleton overlay) runs on this type so the
/// overlay lines up with the coordinates that produced the score.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pixels: RgbaImage,
}

impl NormalizedImage {
    /// Decode an encoded photo, apply its EXIF orientation and downsample it
    pub fn from_encoded(bytes: &[u8], max_dimension: u32) -> ImageResult<Self> {
        let mut decoder = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?.into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut image = DynamicImage::from_decoder(decoder)?;
        image.apply_orientation(orientation);
        Ok(Self::upright(image, max_dimension))
    }

    /// Wrap a raster that is already upright, downsampling it if needed
    pub fn upright(image: DynamicImage, max_dimension: u32) -> Self {
        let bounded = if max_dimension > 0
            && (image.width() > max_dimension || image.height() > max_dimension)
        {
            image.resize(max_dimension, max_dimension, FilterType::Triangle)
        } else {
            image
        };
        Self { pixels: bounded.to_rgba8() }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_order() {
        assert_eq!(ShotDirection::Front.next(), Some(ShotDirection::Right));
        assert_eq!(ShotDirection::Right.next(), Some(ShotDirection::Back));
        assert_eq!(ShotDirection::Back.next(), Some(ShotDirection::Left));
        assert_eq!(ShotDirection::Left.next(), None);
        for (i, d) in ShotDirection::ALL.iter().enumerate() {
            assert_eq!(d.index(), i);
        }
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(ShotDirection::parse("BACK"), Some(ShotDirection::Back));
        assert_eq!(ShotDirection::parse("up"), None);
        assert!(ShotDirection::Left.is_side());
        assert!(!ShotDirection::Front.is_side());
    }

    #[test]
    fn test_confident_filters_low_scores() {
        let joints = JointMap::new()
            .with(JointName::Neck, 0.5, 0.8, 0.9)
            .with(JointName::LeftKnee, 0.4, 0.2, 0.1);
        assert!(joints.confident(JointName::Neck, 0.3).is_some());
        assert!(joints.confident(JointName::LeftKnee, 0.3).is_none());
        assert!(joints.get(JointName::LeftKnee).is_some());
    }

    #[test]
    fn test_joint_map_json_uses_snake_case() {
        let joints = JointMap::new().with(JointName::LeftShoulder, 0.4, 0.7, 1.0);
        let json = serde_json::to_value(&joints).unwrap();
        assert_eq!(json["left_shoulder"]["x"], 0.4);
    }

    #[test]
    fn test_normalized_image_downsamples() {
        let image = DynamicImage::new_rgba8(2000, 1000);
        let normalized = NormalizedImage::upright(image, 1024);
        assert_eq!(normalized.width(), 1024);
        assert_eq!(normalized.height(), 512);
    }

    #[test]
    fn test_normalized_image_keeps_small_images() {
        let normalized = NormalizedImage::upright(DynamicImage::new_rgba8(300, 400), 1024);
        assert_eq!((normalized.width(), normalized.height()), (300, 400));
    }

    #[test]
    fn test_from_encoded_png() {
        let mut buf = Vec::new();
        DynamicImage::new_rgba8(40, 80)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        let normalized = NormalizedImage::from_encoded(&buf, 20).unwrap();
        assert_eq!((normalized.width(), normalized.height()), (10, 20));
    }

    #[test]
    fn test_from_encoded_rejects_garbage() {
        assert!(NormalizedImage::from_encoded(b"not an image", 1024).is_err());
    }
}
