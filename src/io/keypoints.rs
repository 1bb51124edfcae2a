//! Keypoint detection seam
//!
//! The analysis pipeline only needs "image in, joint map out". Detection runs
//! on blocking worker threads, so providers are synchronous.
//!
//! `CommandKeypointProvider` delegates to an external program: the normalized
//! image is written to a temporary PNG whose path is appended to the
//! configured arguments, and the program prints one JSON document on stdout:
//!
//! ```json
//! {"joints": {"left_shoulder": {"x": 0.41, "y": 0.72, "confidence": 0.93}}}
//! ```
//!
//! Coordinates are normalized with the origin at the bottom-left corner.
//! Unknown joint names are skipped. A successful run that yields no known
//! joints is an empty map, which scoring treats as a degenerate view.

use crate::domain::types::{JointMap, JointName, JointPoint, NormalizedImage};
use crate::error::DetectionError;
use crate::infra::config::Config;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, warn};

/// Joint detector for a single upright image
pub trait KeypointProvider: Send + Sync + 'static {
    fn detect(&self, image: &NormalizedImage) -> Result<JointMap, DetectionError>;
}

/// Wire format printed by detector programs
#[derive(Debug, Deserialize)]
struct DetectorOutput {
    #[serde(default)]
    joints: FxHashMap<String, JointPoint>,
}

/// Parse detector stdout into a joint map
pub fn parse_detector_output(stdout: &[u8]) -> Result<JointMap, DetectionError> {
    let output: DetectorOutput = serde_json::from_slice(stdout)
        .map_err(|e| DetectionError::InvalidOutput(e.to_string()))?;

    let mut joints = JointMap::new();
    for (name, point) in output.joints {
        let Some(joint) = JointName::parse(&name) else {
            debug!(joint = %name, "detector_joint_skipped");
            continue;
        };
        if !(point.x.is_finite() && point.y.is_finite() && point.confidence.is_finite()) {
            return Err(DetectionError::InvalidOutput(format!("non-finite value for {joint}")));
        }
        joints.insert(joint, point);
    }
    Ok(joints)
}

/// Runs an external detector program per image
pub struct CommandKeypointProvider {
    program: String,
    args: Vec<String>,
}

impl CommandKeypointProvider {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    /// Provider from the `[detector]` section, if a command is configured
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .detector_command()
            .map(|cmd| Self::new(cmd, config.detector_args().to_vec()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl KeypointProvider for CommandKeypointProvider {
    fn detect(&self, image: &NormalizedImage) -> Result<JointMap, DetectionError> {
        let start = Instant::now();
        let input = tempfile::Builder::new().prefix("posture-").suffix(".png").tempfile()?;
        image.pixels().save_with_format(input.path(), image::ImageFormat::Png)?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(input.path())
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                program = %self.program,
                status = %output.status,
                stderr = %stderr.trim(),
                "detector_exit_failure"
            );
            return Err(DetectionError::Provider(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        let joints = parse_detector_output(&output.stdout)?;
        debug!(
            program = %self.program,
            joints = %joints.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "detector_finished"
        );
        Ok(joints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_joints() {
        let json = br#"{"joints": {
            "left_shoulder": {"x": 0.4, "y": 0.7, "confidence": 0.9},
            "right_shoulder": {"x": 0.6, "y": 0.7, "confidence": 0.8}
        }}"#;
        let joints = parse_detector_output(json).unwrap();
        assert_eq!(joints.len(), 2);
        assert_eq!(joints.get(JointName::LeftShoulder), Some(&JointPoint::new(0.4, 0.7, 0.9)));
    }

    #[test]
    fn test_parse_skips_unknown_joints() {
        let json = br#"{"joints": {
            "neck": {"x": 0.5, "y": 0.8, "confidence": 0.9},
            "left_pinky": {"x": 0.1, "y": 0.1, "confidence": 0.9}
        }}"#;
        let joints = parse_detector_output(json).unwrap();
        assert_eq!(joints.len(), 1);
        assert!(joints.get(JointName::Neck).is_some());
    }

    #[test]
    fn test_parse_empty_is_degenerate_not_error() {
        use crate::services::extractor::{extract, Extraction};

        for json in [&br#"{"joints": {}}"#[..], br#"{}"#, br#"{"joints": {"tail": {"x": 0.1, "y": 0.1, "confidence": 0.9}}}"#] {
            let joints = parse_detector_output(json).unwrap();
            assert!(joints.is_empty());
            assert!(matches!(extract(&joints, 0.3), Extraction::Degenerate));
        }
    }

    #[test]
    fn test_parse_garbage_is_invalid() {
        let err = parse_detector_output(b"not json").unwrap_err();
        assert!(matches!(err, DetectionError::InvalidOutput(_)));
    }

    #[test]
    fn test_from_config_requires_command() {
        assert!(CommandKeypointProvider::from_config(&Config::default()).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_provider_runs_program() {
        let image = NormalizedImage::upright(image::DynamicImage::new_rgba8(8, 8), 0);
        let provider = CommandKeypointProvider::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"test -s "$0" && echo '{"joints":{"nose":{"x":0.5,"y":0.9,"confidence":0.99}}}'"#
                    .to_string(),
            ],
        );
        let joints = provider.detect(&image).unwrap();
        assert_eq!(joints.get(JointName::Nose).map(|p| p.confidence), Some(0.99));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_provider_failure_status() {
        let image = NormalizedImage::upright(image::DynamicImage::new_rgba8(4, 4), 0);
        let provider = CommandKeypointProvider::new("sh", vec!["-c".to_string(), "exit 3".to_string()]);
        let err = provider.detect(&image).unwrap_err();
        assert!(matches!(err, DetectionError::Provider(_)));
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let image = NormalizedImage::upright(image::DynamicImage::new_rgba8(4, 4), 0);
        let provider = CommandKeypointProvider::new("/nonexistent/posture-detector", Vec::new());
        assert!(matches!(provider.detect(&image).unwrap_err(), DetectionError::Io(_)));
    }
}
