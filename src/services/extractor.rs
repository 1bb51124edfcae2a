//! Joint map → posture metrics
//!
//! Both shoulders and both hips are required; without them the view is
//! degenerate. Neck, knees and ankles are optional and only zero out the
//! metric that needs them.

use crate::domain::types::{JointMap, JointName, PostureMetrics};

/// Result of metric extraction for one image
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extraction {
    Measured(PostureMetrics),
    /// A required joint (shoulder or hip) was not detected
    Degenerate,
}

impl Extraction {
    /// Metrics to report; all zero for a degenerate view
    pub fn metrics(&self) -> PostureMetrics {
        match self {
            Extraction::Measured(metrics) => *metrics,
            Extraction::Degenerate => PostureMetrics::ZERO,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, Extraction::Degenerate)
    }
}

/// Angle of the shoulder line away from horizontal, in degrees (0..=90)
///
/// Equal to `min(|atan2(dy, dx)|, 180 - |atan2(dy, dx)|)`: a level line is 0°
/// whichever side of the image the subject's left shoulder appears on.
pub fn shoulder_line_tilt_deg(dx: f64, dy: f64) -> f64 {
    dy.abs().atan2(dx.abs()).to_degrees()
}

/// Vertical difference between a left/right joint pair, 0 if either is missing
fn pair_height_diff(joints: &JointMap, left: JointName, right: JointName, min_confidence: f64) -> f64 {
    match (joints.confident(left, min_confidence), joints.confident(right, min_confidence)) {
        (Some(l), Some(r)) => (l.y - r.y).abs(),
        _ => 0.0,
    }
}

/// Convert a joint map into posture metrics. Pure function of its inputs.
pub fn extract(joints: &JointMap, min_confidence: f64) -> Extraction {
    let required = (
        joints.confident(JointName::LeftShoulder, min_confidence),
        joints.confident(JointName::RightShoulder, min_confidence),
        joints.confident(JointName::LeftHip, min_confidence),
        joints.confident(JointName::RightHip, min_confidence),
    );
    let (Some(left_shoulder), Some(right_shoulder), Some(left_hip), Some(right_hip)) = required
    else {
        return Extraction::Degenerate;
    };

    let shoulder_diff = (left_shoulder.y - right_shoulder.y).abs();
    let hip_diff = (left_hip.y - right_hip.y).abs();
    let torso_tilt_deg = shoulder_line_tilt_deg(
        left_shoulder.x - right_shoulder.x,
        left_shoulder.y - right_shoulder.y,
    );

    let hip_mid_x = (left_hip.x + right_hip.x) / 2.0;
    let head_offset_x = joints
        .confident(JointName::Neck, min_confidence)
        .map(|neck| (neck.x - hip_mid_x).abs())
        .unwrap_or(0.0);

    let knee_diff = pair_height_diff(joints, JointName::LeftKnee, JointName::RightKnee, min_confidence);
    let ankle_diff =
        pair_height_diff(joints, JointName::LeftAnkle, JointName::RightAnkle, min_confidence);

    Extraction::Measured(PostureMetrics {
        shoulder_diff,
        hip_diff,
        torso_tilt_deg,
        head_offset_x,
        knee_diff,
        ankle_diff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN_CONF: f64 = 0.3;

    fn level_torso() -> JointMap {
        JointMap::new()
            .with(JointName::LeftShoulder, 0.40, 0.70, 0.9)
            .with(JointName::RightShoulder, 0.60, 0.70, 0.9)
            .with(JointName::LeftHip, 0.42, 0.40, 0.9)
            .with(JointName::RightHip, 0.58, 0.40, 0.9)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_level_torso_is_all_zero() {
        let metrics = extract(&level_torso(), MIN_CONF).metrics();
        assert_eq!(metrics, PostureMetrics::ZERO);
    }

    #[test]
    fn test_missing_required_joint_is_degenerate() {
        for missing in [
            JointName::LeftShoulder,
            JointName::RightShoulder,
            JointName::LeftHip,
            JointName::RightHip,
        ] {
            let joints: JointMap = level_torso()
                .iter()
                .filter(|(name, _)| *name != missing)
                .map(|(name, p)| (name, *p))
                .collect();
            let joints = joints
                .with(JointName::Neck, 0.5, 0.8, 0.9)
                .with(JointName::LeftKnee, 0.4, 0.2, 0.9)
                .with(JointName::RightKnee, 0.6, 0.1, 0.9);
            let extraction = extract(&joints, MIN_CONF);
            assert!(extraction.is_degenerate(), "missing {missing} should be degenerate");
            assert_eq!(extraction.metrics(), PostureMetrics::ZERO);
        }
    }

    #[test]
    fn test_low_confidence_required_joint_is_degenerate() {
        let joints = level_torso().with(JointName::LeftHip, 0.42, 0.40, 0.1);
        assert!(extract(&joints, MIN_CONF).is_degenerate());
    }

    #[test]
    fn test_differences() {
        let joints = JointMap::new()
            .with(JointName::LeftShoulder, 0.60, 0.72, 0.9)
            .with(JointName::RightShoulder, 0.40, 0.70, 0.9)
            .with(JointName::LeftHip, 0.58, 0.41, 0.9)
            .with(JointName::RightHip, 0.42, 0.40, 0.9)
            .with(JointName::Neck, 0.53, 0.80, 0.9)
            .with(JointName::LeftKnee, 0.57, 0.25, 0.9)
            .with(JointName::RightKnee, 0.43, 0.22, 0.9)
            .with(JointName::LeftAnkle, 0.56, 0.05, 0.9)
            .with(JointName::RightAnkle, 0.44, 0.06, 0.9);

        let m = extract(&joints, MIN_CONF).metrics();
        assert!(approx(m.shoulder_diff, 0.02));
        assert!(approx(m.hip_diff, 0.01));
        assert!(approx(m.head_offset_x, 0.03));
        assert!(approx(m.knee_diff, 0.03));
        assert!(approx(m.ankle_diff, 0.01));
        assert!(approx(m.torso_tilt_deg, (0.02f64).atan2(0.20).to_degrees()));
    }

    #[test]
    fn test_optional_joints_degrade_to_zero() {
        let joints = level_torso()
            .with(JointName::LeftShoulder, 0.40, 0.75, 0.9)
            .with(JointName::LeftKnee, 0.40, 0.20, 0.9);
        let m = extract(&joints, MIN_CONF).metrics();
        assert!(approx(m.shoulder_diff, 0.05));
        assert_eq!(m.head_offset_x, 0.0);
        assert_eq!(m.knee_diff, 0.0);
        assert_eq!(m.ankle_diff, 0.0);
    }

    #[test]
    fn test_tilt_is_mirror_invariant() {
        let a = shoulder_line_tilt_deg(0.2, 0.02);
        let b = shoulder_line_tilt_deg(-0.2, 0.02);
        let c = shoulder_line_tilt_deg(-0.2, -0.02);
        assert!(approx(a, b));
        assert!(approx(a, c));
        assert!(approx(shoulder_line_tilt_deg(0.0, 0.1), 90.0));
        assert_eq!(shoulder_line_tilt_deg(0.0, 0.0), 0.0);
    }
}
