//! Multi-resolution tile pyramid.
//!
//! One grid is generated per canvas size. The coarsest level is a single base
//! tile covering the whole image; every finer level splits the image into
//! tiles whose union is exactly the image bounds.

use crate::geometry::{IntRect, IntSize};
use crate::sample::{SampleSize, calculate_sample_size};
use crate::tile::{LevelLayout, Tile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLevel {
    sample_size: SampleSize,
    layout: LevelLayout,
    tiles: Vec<Tile>,
}

impl TileLevel {
    pub fn sample_size(&self) -> SampleSize {
        self.sample_size
    }

    pub fn layout(&self) -> LevelLayout {
        self.layout
    }

    /// Tiles in row-major order.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    canvas_size: IntSize,
    image_size: IntSize,
    base: Tile,
    // Ordered coarsest first, without the base level.
    foreground: Vec<TileLevel>,
}

impl TileGrid {
    pub fn generate(canvas_size: IntSize, image_size: IntSize) -> TileGrid {
        assert!(
            !canvas_size.is_empty(),
            "can't generate a tile grid for an empty canvas {canvas_size}"
        );
        assert!(
            !image_size.is_empty(),
            "can't generate a tile grid for an empty image {image_size}"
        );

        let base_sample_size = calculate_sample_size(canvas_size, image_size);
        let base = Tile::new(base_sample_size, IntRect::from_size(image_size));

        // Smaller tiles mean more decodes in flight; half the canvas keeps the
        // count per level bounded regardless of the zoom level.
        let min_tile_width = (canvas_size.width as f64 / 2.0).min(image_size.width as f64);
        let min_tile_height = (canvas_size.height as f64 / 2.0).min(image_size.height as f64);

        let foreground = std::iter::successors(base_sample_size.finer(), |sample_size| {
            sample_size.finer()
        })
        .map(|sample_size| {
            let ratio = sample_size.get() as f64 / base_sample_size.get() as f64;
            let tile_width = discard_fraction((image_size.width as f64 * ratio).max(min_tile_width));
            let tile_height =
                discard_fraction((image_size.height as f64 * ratio).max(min_tile_height));
            generate_level(sample_size, image_size, tile_width, tile_height)
        })
        .collect();

        TileGrid {
            canvas_size,
            image_size,
            base,
            foreground,
        }
    }

    pub fn canvas_size(&self) -> IntSize {
        self.canvas_size
    }

    pub fn image_size(&self) -> IntSize {
        self.image_size
    }

    /// Low resolution fallback covering the whole image.
    pub fn base(&self) -> Tile {
        self.base
    }

    pub fn base_sample_size(&self) -> SampleSize {
        self.base.sample_size
    }

    pub fn foreground(&self) -> &[TileLevel] {
        &self.foreground
    }

    pub fn level(&self, sample_size: SampleSize) -> Option<&TileLevel> {
        self.foreground
            .iter()
            .find(|level| level.sample_size == sample_size)
    }

    /// Foreground tiles to draw at `sample_size`. Sample sizes at or above the
    /// base level have no foreground: the base tile already covers them.
    pub fn foreground_tiles(&self, sample_size: SampleSize) -> &[Tile] {
        if sample_size >= self.base.sample_size {
            return &[];
        }
        match self.level(sample_size) {
            Some(level) => level.tiles(),
            None => panic!(
                "tile grid for canvas {} and image {} has no level for sample size {}",
                self.canvas_size, self.image_size, sample_size
            ),
        }
    }

    /// Sample size and tile count of every level, base level first.
    pub fn level_summary(&self) -> Vec<(SampleSize, usize)> {
        std::iter::once((self.base.sample_size, 1))
            .chain(
                self.foreground
                    .iter()
                    .map(|level| (level.sample_size, level.tiles.len())),
            )
            .collect()
    }
}

fn discard_fraction(value: f64) -> u32 {
    (value.floor() as u32).max(1)
}

fn generate_level(
    sample_size: SampleSize,
    image_size: IntSize,
    tile_width: u32,
    tile_height: u32,
) -> TileLevel {
    // The tile count would be fractional; the remainder is folded into the
    // last tile of every row and column instead.
    let tiles_per_row = (image_size.width / tile_width).max(1);
    let tiles_per_column = (image_size.height / tile_height).max(1);
    let layout = LevelLayout {
        tile_width,
        tile_height,
        tiles_per_row,
        tiles_per_column,
    };

    let image_right = image_size.width as i32;
    let image_bottom = image_size.height as i32;
    let mut tiles = Vec::with_capacity(layout.max_tiles());
    for y in 0..tiles_per_column {
        let is_last_row = y == tiles_per_column - 1;
        let top = (y * tile_height) as i32;
        let bottom = if is_last_row {
            image_bottom
        } else {
            ((y + 1) * tile_height) as i32
        };
        for x in 0..tiles_per_row {
            let is_last_column = x == tiles_per_row - 1;
            let left = (x * tile_width) as i32;
            let right = if is_last_column {
                image_right
            } else {
                ((x + 1) * tile_width) as i32
            };
            tiles.push(Tile::new(
                sample_size,
                IntRect::new(left, top, right, bottom),
            ));
        }
    }

    TileLevel {
        sample_size,
        layout,
        tiles,
    }
}
