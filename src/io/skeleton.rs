//! Skeleton overlay rendering
//!
//! Draws the detected joints and the bones between them on a copy of the
//! normalized image. Joints are normalized with a bottom-left origin, so y is
//! flipped when mapping to pixel rows.

use crate::domain::types::{JointMap, JointName, JointPoint};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

/// Confidence below which a joint is left out of the overlay
pub const DEFAULT_DRAW_CONFIDENCE: f64 = 0.3;

/// Bone list: head, arms, spine, pelvis, legs
pub const SKELETON_EDGES: [(JointName, JointName); 15] = [
    (JointName::Nose, JointName::Neck),
    (JointName::Neck, JointName::LeftShoulder),
    (JointName::Neck, JointName::RightShoulder),
    (JointName::LeftShoulder, JointName::LeftElbow),
    (JointName::LeftElbow, JointName::LeftWrist),
    (JointName::RightShoulder, JointName::RightElbow),
    (JointName::RightElbow, JointName::RightWrist),
    (JointName::Neck, JointName::Root),
    (JointName::Root, JointName::LeftHip),
    (JointName::Root, JointName::RightHip),
    (JointName::LeftHip, JointName::RightHip),
    (JointName::LeftHip, JointName::LeftKnee),
    (JointName::LeftKnee, JointName::LeftAnkle),
    (JointName::RightHip, JointName::RightKnee),
    (JointName::RightKnee, JointName::RightAnkle),
];

const LEFT_COLOR: Rgba<u8> = Rgba([64, 200, 255, 255]);
const RIGHT_COLOR: Rgba<u8> = Rgba([255, 140, 64, 255]);
const CENTER_COLOR: Rgba<u8> = Rgba([120, 255, 120, 255]);
const JOINT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

fn is_left(joint: JointName) -> bool {
    matches!(
        joint,
        JointName::LeftEye
            | JointName::LeftEar
            | JointName::LeftShoulder
            | JointName::LeftElbow
            | JointName::LeftWrist
            | JointName::LeftHip
            | JointName::LeftKnee
            | JointName::LeftAnkle
    )
}

fn is_right(joint: JointName) -> bool {
    matches!(
        joint,
        JointName::RightEye
            | JointName::RightEar
            | JointName::RightShoulder
            | JointName::RightElbow
            | JointName::RightWrist
            | JointName::RightHip
            | JointName::RightKnee
            | JointName::RightAnkle
    )
}

fn bone_color(a: JointName, b: JointName) -> Rgba<u8> {
    if is_left(a) && is_left(b) {
        LEFT_COLOR
    } else if is_right(a) && is_right(b) {
        RIGHT_COLOR
    } else {
        CENTER_COLOR
    }
}

/// Map a normalized joint to pixel coordinates (top-left origin)
#[inline]
pub fn to_pixel(point: &JointPoint, width: u32, height: u32) -> (f32, f32) {
    let px = point.x.clamp(0.0, 1.0) * f64::from(width);
    let py = (1.0 - point.y.clamp(0.0, 1.0)) * f64::from(height);
    (px as f32, py as f32)
}

/// Draws skeleton overlays
#[derive(Debug, Clone)]
pub struct SkeletonRenderer {
    min_confidence: f64,
}

impl Default for SkeletonRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_DRAW_CONFIDENCE)
    }
}

impl SkeletonRenderer {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    /// Line thickness in pixels, scaled to the image
    fn thickness(width: u32, height: u32) -> i32 {
        (width.max(height) / 200).max(2) as i32
    }

    /// Copy `base` and draw the skeleton on it
    pub fn render(&self, base: &RgbaImage, joints: &JointMap) -> RgbaImage {
        let mut canvas = base.clone();
        self.draw(&mut canvas, joints);
        canvas
    }

    /// Draw the skeleton in place. Bones need both endpoints confident.
    pub fn draw(&self, canvas: &mut RgbaImage, joints: &JointMap) {
        let (w, h) = canvas.dimensions();
        if w == 0 || h == 0 {
            return;
        }
        let thickness = Self::thickness(w, h);

        for (a, b) in SKELETON_EDGES {
            let (Some(pa), Some(pb)) = (
                joints.confident(a, self.min_confidence),
                joints.confident(b, self.min_confidence),
            ) else {
                continue;
            };
            draw_thick_line(
                canvas,
                to_pixel(pa, w, h),
                to_pixel(pb, w, h),
                thickness,
                bone_color(a, b),
            );
        }

        let radius = thickness + 1;
        for (_, point) in joints.iter().filter(|(_, p)| p.confidence >= self.min_confidence) {
            let (x, y) = to_pixel(point, w, h);
            draw_filled_circle_mut(canvas, (x.round() as i32, y.round() as i32), radius, JOINT_COLOR);
        }
    }
}

/// Line of the given width, drawn as parallel one-pixel segments
fn draw_thick_line(
    canvas: &mut RgbaImage,
    start: (f32, f32),
    end: (f32, f32),
    thickness: i32,
    color: Rgba<u8>,
) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len < f32::EPSILON {
        return;
    }
    let (nx, ny) = (-dy / len, dx / len);
    let half = thickness / 2;
    for offset in -half..=half {
        let o = offset as f32;
        draw_line_segment_mut(
            canvas,
            (start.0 + nx * o, start.1 + ny * o),
            (end.0 + nx * o, end.1 + ny * o),
            color,
        );
    }
}
