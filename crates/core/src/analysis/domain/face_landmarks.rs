//! 5-point face landmarks and the head-pose angles derived from them.
//!
//! Angles are geometric estimates from a single 2D view, good enough to tell
//! "facing the camera" from "turned away" but not a calibrated 3D pose.

const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;
const NOSE: usize = 2;
const LEFT_MOUTH: usize = 3;
const RIGHT_MOUTH: usize = 4;

/// Relative depth of the nose between the eye line (0.0) and the mouth
/// line (1.0) for a level head.
const NEUTRAL_NOSE_DEPTH: f64 = 0.5;

/// Degrees assigned to a full-scale turn or tilt ratio.
const FULL_TURN_DEGREES: f64 = 90.0;

#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    /// Points with x <= 0 are treated as invisible.
    points: [(f64, f64); 5],
}

impl FaceLandmarks {
    pub fn new(points: [(f64, f64); 5]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64); 5] {
        &self.points
    }

    pub fn has_visible(&self) -> bool {
        self.points.iter().any(|(x, _)| *x > 0.0)
    }

    /// Signed horizontal turn in `[-1.0, 1.0]`: nose offset from the eye
    /// midpoint relative to eye span. Negative = nose left of center.
    pub fn turn_ratio(&self) -> Option<f64> {
        let (left_eye, right_eye, nose) = self.visible_triplet()?;
        let eye_mid_x = (left_eye.0 + right_eye.0) / 2.0;
        let eye_span = (right_eye.0 - left_eye.0).abs();
        if eye_span <= 0.0 {
            return None;
        }
        Some(((nose.0 - eye_mid_x) / eye_span).clamp(-1.0, 1.0))
    }

    pub fn yaw_degrees(&self) -> Option<f64> {
        self.turn_ratio().map(|r| r * FULL_TURN_DEGREES)
    }

    /// In-plane rotation of the eye line. Positive = right eye lower.
    pub fn roll_degrees(&self) -> Option<f64> {
        let (left_eye, right_eye, _) = self.visible_triplet()?;
        let dx = right_eye.0 - left_eye.0;
        let dy = right_eye.1 - left_eye.1;
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        Some(dy.atan2(dx).to_degrees())
    }

    /// Vertical tilt from where the nose sits between eye and mouth lines.
    /// Positive = looking down.
    pub fn pitch_degrees(&self) -> Option<f64> {
        let (left_eye, right_eye, nose) = self.visible_triplet()?;
        let left_mouth = self.visible(LEFT_MOUTH)?;
        let right_mouth = self.visible(RIGHT_MOUTH)?;

        let eye_y = (left_eye.1 + right_eye.1) / 2.0;
        let mouth_y = (left_mouth.1 + right_mouth.1) / 2.0;
        let face_height = mouth_y - eye_y;
        if face_height <= 0.0 {
            return None;
        }
        let depth = (nose.1 - eye_y) / face_height;
        let pitch = (depth - NEUTRAL_NOSE_DEPTH) * FULL_TURN_DEGREES;
        Some(pitch.clamp(-FULL_TURN_DEGREES, FULL_TURN_DEGREES))
    }

    fn visible(&self, index: usize) -> Option<(f64, f64)> {
        let p = self.points[index];
        (p.0 > 0.0).then_some(p)
    }

    fn visible_triplet(&self) -> Option<((f64, f64), (f64, f64), (f64, f64))> {
        Some((
            self.visible(LEFT_EYE)?,
            self.visible(RIGHT_EYE)?,
            self.visible(NOSE)?,
        ))
    }
}
