use serde::Serialize;

use super::face_landmarks::FaceLandmarks;

/// Head turned further than this (degrees) counts toward "looking away".
pub const YAW_LIMIT_DEGREES: f64 = 25.0;
/// Head tilted further than this (degrees) counts toward "looking away".
pub const PITCH_LIMIT_DEGREES: f64 = 20.0;
/// Consecutive off-axis frames before "Looking Away" is reported.
pub const AWAY_STREAK_FRAMES: u32 = 8;
/// Face center offset from frame center (percent of half-width).
pub const SIDEWAYS_LIMIT_PERCENT: f64 = 40.0;

pub const NO_FACE: &str = "No Face Detected";
pub const LOOKING_AWAY: &str = "Looking Away";

/// One detected face in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FaceObservation {
    /// `[x1, y1, x2, y2]`
    pub bbox: [f64; 4],
    pub confidence: f64,
    pub landmarks: Option<[(f64, f64); 5]>,
}

impl FaceObservation {
    fn center_x(&self) -> f64 {
        (self.bbox[0] + self.bbox[2]) / 2.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HeadPose {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub sideways_offset: f64,
}

/// Metrics payload returned to clients for one analyzed frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FaceMetrics {
    pub face_detected: bool,
    pub face_count: usize,
    pub faces: Vec<FaceObservation>,
    pub head_pose: HeadPose,
    pub violations: Vec<String>,
    /// Confidence of the primary face, in percent.
    pub confidence: f64,
}

impl FaceMetrics {
    pub fn no_face() -> Self {
        Self {
            face_detected: false,
            face_count: 0,
            faces: Vec::new(),
            head_pose: HeadPose::default(),
            violations: vec![NO_FACE.to_string()],
            confidence: 0.0,
        }
    }
}

/// Turns raw face observations into [`FaceMetrics`].
///
/// Stateful: "Looking Away" is only reported after the head stays off-axis
/// for [`AWAY_STREAK_FRAMES`] consecutive frames, so one estimator must see
/// the frames of a single stream in order.
#[derive(Debug)]
pub struct MetricsEstimator {
    max_faces: usize,
    away_streak: u32,
}

impl MetricsEstimator {
    pub fn new(max_faces: usize) -> Self {
        Self {
            max_faces: max_faces.max(1),
            away_streak: 0,
        }
    }

    pub fn away_streak(&self) -> u32 {
        self.away_streak
    }

    pub fn estimate(&mut self, frame_width: u32, mut faces: Vec<FaceObservation>) -> FaceMetrics {
        faces.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        faces.truncate(self.max_faces);

        let Some(primary) = faces.first() else {
            self.away_streak = self.away_streak.saturating_sub(1);
            return FaceMetrics::no_face();
        };

        let mut violations = Vec::new();
        if faces.len() > 1 {
            violations.push(format!("Multiple Faces Detected ({})", faces.len()));
        }

        let head_pose = head_pose(primary, frame_width);
        if head_pose.yaw.abs() > YAW_LIMIT_DEGREES || head_pose.pitch.abs() > PITCH_LIMIT_DEGREES {
            self.away_streak += 1;
            if self.away_streak > AWAY_STREAK_FRAMES {
                violations.push(LOOKING_AWAY.to_string());
            }
        } else {
            self.away_streak = self.away_streak.saturating_sub(1);
        }

        if head_pose.sideways_offset.abs() > SIDEWAYS_LIMIT_PERCENT {
            let side = if head_pose.sideways_offset > 0.0 { "Right" } else { "Left" };
            violations.push(format!("Head Shifted {side}"));
        }

        FaceMetrics {
            face_detected: true,
            face_count: faces.len(),
            confidence: round2(primary.confidence * 100.0),
            head_pose,
            violations,
            faces,
        }
    }
}

fn head_pose(face: &FaceObservation, frame_width: u32) -> HeadPose {
    let landmarks = face.landmarks.map(FaceLandmarks::new);
    let angle = |f: fn(&FaceLandmarks) -> Option<f64>| {
        landmarks.as_ref().and_then(f).map(round2).unwrap_or(0.0)
    };

    let half_width = frame_width as f64 / 2.0;
    let sideways_offset = if half_width > 0.0 {
        (face.center_x() - half_width) / half_width * 100.0
    } else {
        0.0
    };

    HeadPose {
        yaw: angle(FaceLandmarks::yaw_degrees),
        pitch: angle(FaceLandmarks::pitch_degrees),
        roll: angle(FaceLandmarks::roll_degrees),
        sideways_offset: round2(sideways_offset),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const WIDTH: u32 = 1000;

    fn face(cx: f64, confidence: f64, nose_dx: f64) -> FaceObservation {
        FaceObservation {
            bbox: [cx - 100.0, 300.0, cx + 100.0, 500.0],
            confidence,
            landmarks: Some([
                (cx - 60.0, 350.0),
                (cx + 60.0, 350.0),
                (cx + nose_dx, 410.0),
                (cx - 40.0, 470.0),
                (cx + 40.0, 470.0),
            ]),
        }
    }

    fn centered() -> FaceObservation {
        face(500.0, 0.9, 0.0)
    }

    fn turned() -> FaceObservation {
        // nose 60px off a 120px eye span = 45 degrees
        face(500.0, 0.9, 60.0)
    }

    #[test]
    fn test_no_faces_reports_violation() {
        let metrics = MetricsEstimator::new(3).estimate(WIDTH, vec![]);
        assert!(!metrics.face_detected);
        assert_eq!(metrics.face_count, 0);
        assert_eq!(metrics.violations, vec![NO_FACE.to_string()]);
    }

    #[test]
    fn test_single_centered_face_is_clean() {
        let metrics = MetricsEstimator::new(3).estimate(WIDTH, vec![centered()]);
        assert!(metrics.face_detected);
        assert_eq!(metrics.face_count, 1);
        assert!(metrics.violations.is_empty());
        assert_relative_eq!(metrics.confidence, 90.0);
        assert_relative_eq!(metrics.head_pose.yaw, 0.0);
        assert_relative_eq!(metrics.head_pose.sideways_offset, 0.0);
    }

    #[test]
    fn test_multiple_faces_sorted_and_capped() {
        let faces = vec![
            face(200.0, 0.5, 0.0),
            face(500.0, 0.95, 0.0),
            face(800.0, 0.7, 0.0),
            face(900.0, 0.6, 0.0),
        ];
        let metrics = MetricsEstimator::new(3).estimate(WIDTH, faces);
        assert_eq!(metrics.face_count, 3);
        assert_relative_eq!(metrics.faces[0].confidence, 0.95);
        assert_relative_eq!(metrics.faces[2].confidence, 0.6);
        assert!(metrics
            .violations
            .contains(&"Multiple Faces Detected (3)".to_string()));
    }

    #[test]
    fn test_looking_away_requires_sustained_streak() {
        let mut estimator = MetricsEstimator::new(1);
        for _ in 0..AWAY_STREAK_FRAMES {
            let m = estimator.estimate(WIDTH, vec![turned()]);
            assert!(!m.violations.contains(&LOOKING_AWAY.to_string()));
        }
        let m = estimator.estimate(WIDTH, vec![turned()]);
        assert!(m.violations.contains(&LOOKING_AWAY.to_string()));
        assert_relative_eq!(m.head_pose.yaw, 45.0);
    }

    #[test]
    fn test_away_streak_decays_when_facing_camera() {
        let mut estimator = MetricsEstimator::new(1);
        for _ in 0..5 {
            estimator.estimate(WIDTH, vec![turned()]);
        }
        assert_eq!(estimator.away_streak(), 5);
        estimator.estimate(WIDTH, vec![centered()]);
        estimator.estimate(WIDTH, vec![]);
        assert_eq!(estimator.away_streak(), 3);
    }

    #[test]
    fn test_sideways_offset_flags_shift() {
        let metrics = MetricsEstimator::new(1).estimate(WIDTH, vec![face(800.0, 0.9, 0.0)]);
        assert_relative_eq!(metrics.head_pose.sideways_offset, 60.0);
        assert!(metrics.violations.contains(&"Head Shifted Right".to_string()));

        let metrics = MetricsEstimator::new(1).estimate(WIDTH, vec![face(150.0, 0.9, 0.0)]);
        assert!(metrics.violations.contains(&"Head Shifted Left".to_string()));
    }

    #[test]
    fn test_missing_landmarks_give_neutral_pose() {
        let mut f = centered();
        f.landmarks = None;
        let metrics = MetricsEstimator::new(1).estimate(WIDTH, vec![f]);
        assert_eq!(metrics.head_pose, HeadPose::default());
    }

    #[test]
    fn test_serializes_client_fields() {
        let metrics = MetricsEstimator::new(1).estimate(WIDTH, vec![centered()]);
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["face_detected"], true);
        assert_eq!(json["face_count"], 1);
        assert!(json["head_pose"]["yaw"].is_number());
        assert!(json["head_pose"]["sideways_offset"].is_number());
        assert!(json["violations"].is_array());
        assert_eq!(json["faces"][0]["bbox"].as_array().unwrap().len(), 4);
    }
}
