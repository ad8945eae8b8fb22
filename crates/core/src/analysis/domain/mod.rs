pub mod analysis_result;
pub mod engine_handle;
pub mod face_landmarks;
pub mod face_metrics;
pub mod frame_analyzer;
