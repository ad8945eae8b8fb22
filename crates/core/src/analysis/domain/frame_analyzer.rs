use thiserror::Error;

use super::face_metrics::FaceMetrics;
use crate::shared::frame::Frame;

/// Error type reported by engine implementations.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Domain interface for the analysis engine.
///
/// Implementations are not assumed reentrant or thread-safe and may keep
/// state across frames, hence `&mut self`. `close` is called exactly once
/// per instance by [`EngineHandle`](super::engine_handle::EngineHandle).
pub trait FrameAnalyzer: Send {
    fn analyze(&mut self, frame: &Frame) -> Result<FaceMetrics, EngineError>;

    fn close(&mut self) -> Result<(), EngineError>;
}

/// Creates analyzer instances, one per session or single-shot request.
pub trait AnalyzerFactory: Send + Sync {
    fn create(&self, max_faces: usize) -> Result<Box<dyn FrameAnalyzer>, EngineInitError>;
}

#[derive(Error, Debug)]
pub enum EngineInitError {
    #[error("analyzer backend failed to initialize: {0}")]
    Backend(#[source] EngineError),
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),
}

/// Per-frame analysis failure. Never fatal to a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("{0}")]
    Engine(String),
    #[error("analyzer panicked while processing the frame")]
    Panicked,
    #[error("analyzer already closed")]
    Closed,
}
