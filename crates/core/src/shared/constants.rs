pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Height bound for streaming sessions. Larger than the single-shot bound
/// because a session amortizes engine creation across many frames.
pub const STREAM_MAX_HEIGHT: u32 = 720;

/// Height bound for single-shot requests.
pub const SINGLE_SHOT_MAX_HEIGHT: u32 = 480;

/// Faces each engine instance is asked to track.
pub const DEFAULT_MAX_FACES: usize = 3;

/// Log a progress line every N processed frames per session.
pub const PROGRESS_LOG_INTERVAL: u64 = 30;
