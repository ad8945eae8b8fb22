//! Service configuration.

use std::time::Duration;

use facestream_core::shared::constants::{
    DEFAULT_MAX_FACES, PROGRESS_LOG_INTERVAL, SINGLE_SHOT_MAX_HEIGHT, STREAM_MAX_HEIGHT,
};

/// Runtime configuration for the streaming service.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8000`, `0` to auto-assign).
    pub port: u16,
    /// Height bound applied to streamed frames.
    pub stream_max_height: u32,
    /// Height bound applied to single-shot frames.
    pub single_shot_max_height: u32,
    /// Faces reported per frame by each engine instance.
    pub max_faces: usize,
    /// Analysis worker threads shared by all sessions.
    pub analysis_workers: usize,
    /// Deadline for single-shot requests; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Max WebSocket message and upload body size in bytes.
    pub max_message_size: usize,
    /// Log session progress every this many processed frames.
    pub progress_log_interval: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            stream_max_height: STREAM_MAX_HEIGHT,
            single_shot_max_height: SINGLE_SHOT_MAX_HEIGHT,
            max_faces: DEFAULT_MAX_FACES,
            analysis_workers: default_workers(),
            request_timeout: Some(Duration::from_secs(30)),
            max_message_size: 16 * 1024 * 1024,
            progress_log_interval: PROGRESS_LOG_INTERVAL,
        }
    }
}

impl ServiceConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One analysis worker per available core.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
