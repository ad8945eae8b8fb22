use serde::Serialize;

use super::face_metrics::FaceMetrics;

/// Outcome of processing one frame: metrics or an error payload, never both.
///
/// Serializes to the bare metrics object or to `{"error": "..."}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisResult {
    Metrics(FaceMetrics),
    Error { error: String },
}

impl AnalysisResult {
    pub fn error(message: impl Into<String>) -> Self {
        AnalysisResult::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AnalysisResult::Error { .. })
    }
}

impl From<FaceMetrics> for AnalysisResult {
    fn from(metrics: FaceMetrics) -> Self {
        AnalysisResult::Metrics(metrics)
    }
}
