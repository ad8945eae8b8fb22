use image::{Rgb, RgbImage};

/// One decoded stream frame, always 8-bit RGB.
///
/// Frames carry no persistent identity. `sequence` is the frame's position
/// within its session and only shows up in logs.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    image: RgbImage,
    sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image, sequence: 0 }
    }

    /// A frame of one solid color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Pixel at column `x`, row `y`. Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Interleaved RGB bytes in row-major order.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
}
