//! Values that cross from the pipeline thread to its consumers.

use std::fmt;
use std::sync::Arc;

use decoder::{Bitmap, OpenError};
use model::{IntRect, IntSize, Tile};

/// A tile placed on screen for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasRegionTile {
    pub tile: Tile,
    /// `None` until the tile's bitmap is loaded. Never set for a tile whose
    /// decode failed.
    pub bitmap: Option<Bitmap>,
    /// `bitmap` is the source's preview standing in for the base tile.
    pub preview: bool,
    /// Destination in viewport pixels, every edge floored.
    pub bounds: IntRect,
}

impl CanvasRegionTile {
    /// Has pixels to draw, decoded or preview.
    pub fn is_drawn(&self) -> bool {
        self.bitmap.is_some()
    }

    /// Drawn from a decode of this tile.
    pub fn is_loaded(&self) -> bool {
        self.bitmap.is_some() && !self.preview
    }
}

/// Draw list in paint order: the base tile first when it is shown, then the
/// visible tiles of the active level in row-major order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderSnapshot {
    pub revision: u64,
    /// Oriented size of the open image, `None` while no image is open.
    pub image_size: Option<IntSize>,
    pub tiles: Vec<CanvasRegionTile>,
}

impl RenderSnapshot {
    pub fn loaded_tiles(&self) -> usize {
        self.tiles.iter().filter(|tile| tile.is_loaded()).count()
    }

    pub fn is_displayed(&self) -> bool {
        self.tiles.iter().any(CanvasRegionTile::is_drawn)
    }

    /// Something is drawn and every tile comes from its own decode.
    pub fn is_full_quality(&self) -> bool {
        !self.tiles.is_empty() && self.tiles.iter().all(CanvasRegionTile::is_loaded)
    }

    /// Same draw list as `other`, ignoring the revision.
    pub fn same_tiles(&self, other: &Self) -> bool {
        self.image_size == other.image_size && self.tiles == other.tiles
    }
}

#[derive(Debug, Clone)]
pub enum ImageEvent {
    Opened { image_size: IntSize },
    OpenFailed { error: Arc<OpenError> },
    /// The first pixels of the source are on screen, possibly only its
    /// preview. Sent at most once per source.
    Displayed,
    /// Every drawn tile is decoded. Sent at most once per source.
    FullQualityDisplayed,
}

impl fmt::Display for ImageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened { image_size } => write!(f, "opened {image_size} image"),
            Self::OpenFailed { error } => write!(f, "open failed: {error}"),
            Self::Displayed => f.write_str("displayed"),
            Self::FullQualityDisplayed => f.write_str("full quality displayed"),
        }
    }
}
