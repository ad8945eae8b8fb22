use super::face_metrics::FaceMetrics;
use super::frame_analyzer::{AnalysisError, AnalyzerFactory, EngineError, EngineInitError, FrameAnalyzer};
use crate::shared::frame::Frame;

/// Exclusive owner of one analyzer instance.
///
/// The handle is moved, never shared: whoever holds it is the only caller
/// that can reach the analyzer. The analyzer is closed exactly once, either
/// through [`EngineHandle::close`] or, on any other exit path, on drop.
pub struct EngineHandle {
    analyzer: Option<Box<dyn FrameAnalyzer>>,
}

impl EngineHandle {
    pub fn new(analyzer: Box<dyn FrameAnalyzer>) -> Self {
        Self {
            analyzer: Some(analyzer),
        }
    }

    /// Create an analyzer through `factory` and take ownership of it.
    pub fn open(factory: &dyn AnalyzerFactory, max_faces: usize) -> Result<Self, EngineInitError> {
        factory.create(max_faces).map(Self::new)
    }

    pub fn analyze(&mut self, frame: &Frame) -> Result<FaceMetrics, AnalysisError> {
        let analyzer = self.analyzer.as_mut().ok_or(AnalysisError::Closed)?;
        analyzer
            .analyze(frame)
            .map_err(|e| AnalysisError::Engine(e.to_string()))
    }

    /// Close the analyzer, reporting any failure to the caller.
    pub fn close(mut self) -> Result<(), EngineError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), EngineError> {
        match self.analyzer.take() {
            Some(mut analyzer) => analyzer.close(),
            None => Ok(()),
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::error!("Failed to close analyzer: {e}");
        }
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("open", &self.analyzer.is_some())
            .finish()
    }
}
