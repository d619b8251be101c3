use std::fmt;

use crate::geometry::IntRect;
use crate::sample::SampleSize;

/// A region of the source image decoded at a fixed sample size.
///
/// Equality and hashing use both fields, which makes a tile usable as the
/// cache key for its bitmap. A tile never owns pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub sample_size: SampleSize,
    pub bounds: IntRect,
}

impl Tile {
    pub const fn new(sample_size: SampleSize, bounds: IntRect) -> Self {
        Self {
            sample_size,
            bounds,
        }
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "tile[{} @ ({}, {})..({}, {})]",
            self.sample_size,
            self.bounds.left,
            self.bounds.top,
            self.bounds.right,
            self.bounds.bottom
        )
    }
}

/// Row-major arrangement of the tiles of one grid level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LevelLayout {
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_per_row: u32,
    pub tiles_per_column: u32,
}

impl LevelLayout {
    pub const fn max_tiles(self) -> usize {
        self.tiles_per_row as usize * self.tiles_per_column as usize
    }
}
