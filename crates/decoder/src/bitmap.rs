use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use model::IntSize;

/// Decoded pixels shared between the cache and the render snapshots.
///
/// Cloning is cheap. Two handles compare equal only when they share the same
/// pixel buffer.
#[derive(Clone)]
pub struct Bitmap {
    pixels: Arc<RgbaImage>,
}

impl Bitmap {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn size(&self) -> IntSize {
        IntSize::new(self.pixels.width(), self.pixels.height())
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl Eq for Bitmap {}

impl fmt::Debug for Bitmap {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Bitmap")
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_identity_of_the_pixel_buffer() {
        let first = Bitmap::new(RgbaImage::new(4, 2));
        let same_pixels = Bitmap::new(RgbaImage::new(4, 2));
        assert_eq!(first, first.clone());
        assert_ne!(first, same_pixels);
        assert_eq!(first.size(), IntSize::new(4, 2));
    }
}
