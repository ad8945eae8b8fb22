//! Stateless single-frame analysis with an engine scoped to the request.

use facestream_core::analysis::domain::engine_handle::EngineHandle;
use facestream_core::analysis::domain::face_metrics::FaceMetrics;
use facestream_core::codec::{frame_codec, frame_normalizer};
use facestream_core::dispatch::analysis_dispatcher::Dispatched;
use facestream_core::shared::frame::Frame;

use crate::error::ApiError;
use crate::server::AppState;

/// How the request carried its frame.
#[derive(Debug)]
pub enum EncodedFrame {
    /// Raw image container bytes.
    Bytes(Vec<u8>),
    /// Base64, optionally data-URL prefixed.
    Base64(String),
}

/// Decode, bound to the single-shot height, and analyze one frame with a
/// fresh engine. The engine is released on every path, including timeout
/// and cancellation, because the handle closes itself when dropped.
pub async fn analyze(app: &AppState, encoded: EncodedFrame) -> Result<FaceMetrics, ApiError> {
    let work = run(app, encoded);
    let metrics = match app.config.request_timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| ApiError::Timeout(limit))??,
        None => work.await?,
    };
    log::info!("Frame analyzed: {} face(s)", metrics.face_count);
    Ok(metrics)
}

async fn run(app: &AppState, encoded: EncodedFrame) -> Result<FaceMetrics, ApiError> {
    let max_height = app.config.single_shot_max_height;
    let frame = tokio::task::spawn_blocking(move || decode(encoded, max_height))
        .await
        .map_err(|e| ApiError::Analysis(e.to_string()))??;

    let factory = app.factory.clone();
    let max_faces = app.config.max_faces;
    let engine = tokio::task::spawn_blocking(move || EngineHandle::open(factory.as_ref(), max_faces))
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    let Dispatched { engine, outcome } = app
        .dispatcher
        .run(engine, frame)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    if let Err(e) = engine.close() {
        log::error!("Cleanup error: {e}");
    }
    outcome.map_err(|e| ApiError::Analysis(e.to_string()))
}

fn decode(encoded: EncodedFrame, max_height: u32) -> Result<Frame, ApiError> {
    let decoded = match encoded {
        EncodedFrame::Bytes(bytes) => frame_codec::decode_bytes(&bytes),
        EncodedFrame::Base64(text) => frame_codec::decode_base64(&text),
    };
    let frame = decoded.map_err(|e| ApiError::BadRequest(e.client_message().to_string()))?;
    Ok(frame_normalizer::bound_height(frame, max_height))
}
