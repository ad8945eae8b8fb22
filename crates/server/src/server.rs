//! Axum HTTP + WebSocket front end.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use facestream_core::analysis::domain::face_metrics::FaceMetrics;
use facestream_core::analysis::domain::frame_analyzer::AnalyzerFactory;
use facestream_core::dispatch::analysis_dispatcher::AnalysisDispatcher;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::frame_message::FrameMessage;
use crate::health::{self, HealthResponse, SummaryResponse};
use crate::registry::SessionRegistry;
use crate::session::connection_session::ConnectionSession;
use crate::single_frame::{self, EncodedFrame};

const NO_FRAME: &str = "No frame data provided";

/// Shared state accessible from Axum handlers and sessions.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    /// Creates one analyzer per session or single-shot request.
    pub factory: Arc<dyn AnalyzerFactory>,
    /// Worker pool shared by every session.
    pub dispatcher: Arc<AnalysisDispatcher>,
    pub registry: Arc<SessionRegistry>,
    /// Cancelled on shutdown; idle sessions drain when it fires.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        factory: Arc<dyn AnalyzerFactory>,
        dispatcher: Arc<AnalysisDispatcher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            factory,
            dispatcher,
            registry: Arc::new(SessionRegistry::new()),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_message_size;
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics/summary", get(summary_handler))
        .route("/analyze/frame", post(analyze_frame_handler))
        .route("/analyze/base64", post(analyze_base64_handler))
        .route("/ws/video", get(ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the configured address and serve until the shutdown token fires.
///
/// Returns the bound address (useful with port 0) and the server task.
pub async fn listen(
    state: AppState,
) -> std::io::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
    let listener = tokio::net::TcpListener::bind(state.config.bind_addr()).await?;
    let addr = listener.local_addr()?;
    log::info!("Listening on http://{addr}");

    let shutdown = state.shutdown.clone();
    let app = router(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
    });
    Ok((addr, handle))
}

/// Wait up to `limit` for every session to leave the registry.
pub async fn drain_sessions(registry: &SessionRegistry, limit: Duration) -> bool {
    let poll = async {
        while !registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    tokio::time::timeout(limit, poll).await.is_ok()
}

/// GET /health
async fn health_handler() -> Json<HealthResponse> {
    Json(health::health_check())
}

/// GET /metrics/summary
async fn summary_handler(State(state): State<AppState>) -> Json<SummaryResponse> {
    Json(health::summary(&state.registry))
}

/// POST /analyze/frame: multipart upload (first field) or raw image body.
async fn analyze_frame_handler(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<FaceMetrics>, ApiError> {
    let bytes = read_upload(request, &state).await?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest(NO_FRAME.into()));
    }
    single_frame::analyze(&state, EncodedFrame::Bytes(bytes.to_vec()))
        .await
        .map(Json)
}

/// POST /analyze/base64: `{"base64_frame": ...}` or `{"frame": ...}`.
async fn analyze_base64_handler(
    State(state): State<AppState>,
    body: Result<Json<FrameMessage>, JsonRejection>,
) -> Result<Json<FaceMetrics>, ApiError> {
    let Json(message) =
        body.map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e.body_text())))?;
    let payload = message
        .into_payload()
        .ok_or_else(|| ApiError::BadRequest(NO_FRAME.into()))?;
    single_frame::analyze(&state, EncodedFrame::Base64(payload))
        .await
        .map(Json)
}

/// GET /ws/video
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let limit = state.config.max_message_size;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            ConnectionSession::new(socket, state).run().await;
        })
}

async fn read_upload(request: Request, state: &AppState) -> Result<Bytes, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        return Bytes::from_request(request, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()));
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
        .ok_or_else(|| ApiError::BadRequest(NO_FRAME.into()))?;
    field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use base64::Engine as _;
    use facestream_core::analysis::domain::frame_analyzer::{
        EngineError, EngineInitError, FrameAnalyzer,
    };
    use facestream_core::shared::frame::Frame;
    use tower::ServiceExt;

    struct FixedAnalyzer;

    impl FrameAnalyzer for FixedAnalyzer {
        fn analyze(&mut self, frame: &Frame) -> Result<FaceMetrics, EngineError> {
            let mut m = FaceMetrics::no_face();
            m.face_count = frame.height() as usize;
            Ok(m)
        }

        fn close(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct FixedFactory {
        available: bool,
    }

    impl AnalyzerFactory for FixedFactory {
        fn create(&self, _max_faces: usize) -> Result<Box<dyn FrameAnalyzer>, EngineInitError> {
            if !self.available {
                return Err(EngineInitError::Unavailable("model missing".into()));
            }
            Ok(Box::new(FixedAnalyzer))
        }
    }

    fn make_app(available: bool) -> Router {
        let dispatcher = Arc::new(AnalysisDispatcher::new(1).unwrap());
        let state = AppState::new(
            ServiceConfig::default(),
            Arc::new(FixedFactory { available }),
            dispatcher,
        );
        router(state)
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    async fn send(app: Router, req: HttpRequest<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post_json(uri: &str, body: String) -> HttpRequest<Body> {
        HttpRequest::post(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let req = HttpRequest::get("/health").body(Body::empty()).unwrap();
        let (status, json) = send(make_app(true), req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "Face Behavior Analyzer");
    }

    #[tokio::test]
    async fn test_summary_endpoint_starts_empty() {
        let req = HttpRequest::get("/metrics/summary").body(Body::empty()).unwrap();
        let (status, json) = send(make_app(true), req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["active_connections"], 0);
        assert_eq!(json["status"], "running");
    }

    #[tokio::test]
    async fn test_unknown_route_returns_404() {
        let req = HttpRequest::get("/nonexistent").body(Body::empty()).unwrap();
        let resp = make_app(true).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_base64_accepts_either_field_name() {
        let b64 = base64::engine::general_purpose::STANDARD.encode(png(8, 600));
        for field in ["frame", "base64_frame"] {
            let body = format!(r#"{{"{field}":"data:image/png;base64,{b64}"}}"#);
            let (status, json) = send(make_app(true), post_json("/analyze/base64", body)).await;

            assert_eq!(status, StatusCode::OK);
            // 600 px bounded to the single-shot height
            assert_eq!(json["face_count"], 480);
        }
    }

    #[tokio::test]
    async fn test_base64_missing_frame_is_400() {
        let body = r#"{"interview_id":"abc"}"#.to_string();
        let (status, json) = send(make_app(true), post_json("/analyze/base64", body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "No frame data provided");
    }

    #[tokio::test]
    async fn test_base64_invalid_encoding_is_400() {
        let body = r#"{"frame":"***"}"#.to_string();
        let (status, json) = send(make_app(true), post_json("/analyze/base64", body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Invalid base64 encoding");
    }

    #[tokio::test]
    async fn test_engine_unavailable_is_503() {
        let b64 = base64::engine::general_purpose::STANDARD.encode(png(4, 4));
        let body = format!(r#"{{"frame":"{b64}"}}"#);
        let (status, json) = send(make_app(false), post_json("/analyze/base64", body)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(json["detail"]
            .as_str()
            .unwrap()
            .starts_with("Analyzer unavailable"));
    }

    #[tokio::test]
    async fn test_frame_upload_raw_body() {
        let req = HttpRequest::post("/analyze/frame")
            .header(CONTENT_TYPE, "image/png")
            .body(Body::from(png(4, 6)))
            .unwrap();
        let (status, json) = send(make_app(true), req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["face_count"], 6);
        assert_eq!(json["face_detected"], false);
    }

    #[tokio::test]
    async fn test_frame_upload_multipart() {
        let boundary = "XBOUNDARYX";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"f.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(&png(5, 7));
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let req = HttpRequest::post("/analyze/frame")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, json) = send(make_app(true), req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["face_count"], 7);
    }

    #[tokio::test]
    async fn test_frame_upload_garbage_is_400() {
        let req = HttpRequest::post("/analyze/frame")
            .body(Body::from(vec![0u8, 1, 2, 3]))
            .unwrap();
        let (status, json) = send(make_app(true), req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Invalid image data");
    }

    #[tokio::test]
    async fn test_frame_upload_empty_is_400() {
        let req = HttpRequest::post("/analyze/frame").body(Body::empty()).unwrap();
        let (status, json) = send(make_app(true), req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "No frame data provided");
    }

    #[tokio::test]
    async fn test_drain_sessions_returns_when_idle() {
        let registry = SessionRegistry::new();
        assert!(drain_sessions(&registry, Duration::from_millis(10)).await);
    }
}
