//! Transport-encoded frame → decoded RGB [`Frame`].
//!
//! Two transport encodings are accepted: base64 text (optionally carrying a
//! data-URL prefix such as `data:image/jpeg;base64,`) and raw container bytes.

use base64::Engine;
use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid base64 encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("Invalid image data: {0}")]
    Image(#[from] image::ImageError),
    #[error("Empty frame ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
}

impl DecodeError {
    /// Short message suitable for returning to a client.
    pub fn client_message(&self) -> &'static str {
        match self {
            DecodeError::Encoding(_) => "Invalid base64 encoding",
            DecodeError::Image(_) => "Invalid image data",
            DecodeError::EmptyFrame { .. } => "Empty image",
        }
    }
}

/// Returns the payload after the first `,` separator, or the whole input.
///
/// The base64 alphabet never contains a comma, so anything before it is a
/// data-URL header.
pub fn strip_data_url_prefix(encoded: &str) -> &str {
    match encoded.split_once(',') {
        Some((_, payload)) => payload,
        None => encoded,
    }
}

/// Decode a base64 (optionally data-URL prefixed) frame.
pub fn decode_base64(encoded: &str) -> Result<Frame, DecodeError> {
    let payload = strip_data_url_prefix(encoded.trim());
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
    decode_bytes(&bytes)
}

/// Decode raw image container bytes (JPEG, PNG, ...) into an RGB frame.
pub fn decode_bytes(bytes: &[u8]) -> Result<Frame, DecodeError> {
    let decoded = image::load_from_memory(bytes)?;
    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(DecodeError::EmptyFrame { width, height });
    }
    Ok(Frame::new(decoded.into_rgb8()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb(color));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn to_base64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[rstest]
    #[case::plain("abcd", "abcd")]
    #[case::data_url("data:image/jpeg;base64,abcd", "abcd")]
    #[case::only_first_separator("x,ab,cd", "ab,cd")]
    #[case::empty("", "")]
    fn test_strip_data_url_prefix(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_data_url_prefix(input), expected);
    }

    #[test]
    fn test_decode_bytes_png() {
        let frame = decode_bytes(&encode_png(8, 4, [10, 20, 30])).unwrap();
        assert_eq!(frame.width(), 8);
        assert_eq!(frame.height(), 4);
        assert_eq!(frame.pixel(7, 3), [10, 20, 30]);
    }

    #[test]
    fn test_decode_base64_plain() {
        let encoded = to_base64(&encode_png(5, 7, [1, 2, 3]));
        let frame = decode_base64(&encoded).unwrap();
        assert_eq!((frame.width(), frame.height()), (5, 7));
    }

    #[test]
    fn test_decode_base64_with_data_url_prefix() {
        let encoded = format!(
            "data:image/png;base64,{}",
            to_base64(&encode_png(3, 3, [200, 100, 50]))
        );
        let frame = decode_base64(&encoded).unwrap();
        assert_eq!(frame.pixel(0, 0), [200, 100, 50]);
    }

    #[rstest]
    #[case::not_base64("not-base64")]
    #[case::bad_chars("@@@@")]
    #[case::truncated_padding("abc")]
    fn test_decode_base64_rejects_malformed_encoding(#[case] input: &str) {
        let err = decode_base64(input).unwrap_err();
        assert!(matches!(err, DecodeError::Encoding(_)));
        assert_eq!(err.client_message(), "Invalid base64 encoding");
    }

    #[test]
    fn test_decode_base64_rejects_non_image_payload() {
        let encoded = to_base64(b"this is definitely not an image");
        let err = decode_base64(&encoded).unwrap_err();
        assert!(matches!(err, DecodeError::Image(_)));
        assert_eq!(err.client_message(), "Invalid image data");
    }

    fn farbfeld_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = b"farbfeld".to_vec();
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes
    }

    #[rstest]
    #[case::farbfeld(farbfeld_header(0, 0))]
    #[case::pnm(b"P6\n0 0\n255\n".to_vec())]
    fn test_decode_bytes_rejects_zero_area_image(#[case] bytes: Vec<u8>) {
        let err = decode_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::EmptyFrame {
                width: 0,
                height: 0
            }
        ));
        assert_eq!(err.client_message(), "Empty image");
    }

    #[test]
    fn test_decode_base64_reports_zero_area_image() {
        let err = decode_base64(&to_base64(&farbfeld_header(0, 0))).unwrap_err();
        assert_eq!(err.client_message(), "Empty image");
    }

    #[test]
    fn test_decode_bytes_rejects_empty_input() {
        assert!(matches!(decode_bytes(&[]), Err(DecodeError::Image(_))));
    }
}
