use image::imageops::{self, FilterType};

use crate::shared::frame::Frame;

/// Bound a frame's height to `max_height`, rescaling proportionally.
///
/// Frames already within the bound come back untouched. Taller frames are
/// resampled with a triangle (bilinear) filter to `height == max_height` and
/// `width == round(width * max_height / height)`. A zero bound disables it.
pub fn bound_height(frame: Frame, max_height: u32) -> Frame {
    let (width, height) = (frame.width(), frame.height());
    if height <= max_height || max_height == 0 {
        return frame;
    }

    let scale = f64::from(max_height) / f64::from(height);
    let new_width = ((f64::from(width) * scale).round() as u32).max(1);
    log::trace!(
        "Frame {}: {width}x{height} -> {new_width}x{max_height}",
        frame.sequence()
    );

    let resized = imageops::resize(frame.image(), new_width, max_height, FilterType::Triangle);
    Frame::new(resized).with_sequence(frame.sequence())
}
