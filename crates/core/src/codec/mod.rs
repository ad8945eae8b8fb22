pub mod frame_codec;
pub mod frame_normalizer;
