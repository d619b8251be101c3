//! Plain value types shared by every crate of the tile viewer: geometry,
//! sample sizes, tiles and the tile pyramid generated for a canvas.

pub mod geometry;
pub mod grid;
pub mod orientation;
pub mod sample;
pub mod tile;

pub use geometry::{IntOffset, IntRect, IntSize, IntSizeParseError, Offset, Rect, ScaleFactor};
pub use grid::{TileGrid, TileLevel};
pub use orientation::{ImageOrientation, UnsupportedOrientation};
pub use sample::{SampleSize, SampleSizeError, calculate_sample_size};
pub use tile::{LevelLayout, Tile};
