use std::fmt;

use crate::geometry::{IntOffset, IntRect, IntSize};

/// Clockwise rotation that has to be applied to the raw pixels for the image
/// to appear upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageOrientation {
    #[default]
    None,
    Rotate90,
    Rotate180,
    Rotate270,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedOrientation(pub i32);

impl fmt::Display for UnsupportedOrientation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "unsupported image orientation at {}°", self.0)
    }
}

impl std::error::Error for UnsupportedOrientation {}

impl ImageOrientation {
    pub fn from_degrees(degrees: i32) -> Result<Self, UnsupportedOrientation> {
        match degrees.rem_euclid(360) {
            0 => Ok(ImageOrientation::None),
            90 => Ok(ImageOrientation::Rotate90),
            180 => Ok(ImageOrientation::Rotate180),
            270 => Ok(ImageOrientation::Rotate270),
            _ => Err(UnsupportedOrientation(degrees)),
        }
    }

    pub const fn degrees(self) -> i32 {
        match self {
            ImageOrientation::None => 0,
            ImageOrientation::Rotate90 => 90,
            ImageOrientation::Rotate180 => 180,
            ImageOrientation::Rotate270 => 270,
        }
    }

    pub const fn is_quarter_turn(self) -> bool {
        matches!(self, ImageOrientation::Rotate90 | ImageOrientation::Rotate270)
    }

    /// Size of the upright image given the size of the raw pixels.
    pub const fn oriented_size(self, raw_size: IntSize) -> IntSize {
        if self.is_quarter_turn() {
            raw_size.transposed()
        } else {
            raw_size
        }
    }

    /// Maps a region of the upright image back onto the raw pixels.
    pub fn to_raw_region(self, oriented_region: IntRect, oriented_size: IntSize) -> IntRect {
        oriented_region.rotate_by(-self.degrees(), IntRect::from_size(oriented_size))
    }
}

impl IntRect {
    /// Position of this rectangle after `unrotated_parent` is rotated
    /// clockwise by `degrees`. Only multiples of 90 are supported.
    pub fn rotate_by(self, degrees: i32, unrotated_parent: IntRect) -> IntRect {
        let parent = unrotated_parent;
        let (top_left, size) = match degrees {
            0 | 360 | -360 => return self,
            90 | -270 => (
                IntOffset::new(parent.bottom - self.bottom, self.left - parent.left),
                self.size().transposed(),
            ),
            180 | -180 => (
                IntOffset::new(parent.right - self.right, parent.bottom - self.bottom),
                self.size(),
            ),
            270 | -90 => (
                IntOffset::new(self.top - parent.top, parent.right - self.right),
                self.size().transposed(),
            ),
            _ => panic!("unsupported orientation = {degrees}"),
        };
        IntRect::from_origin_size(top_left, size)
    }
}
