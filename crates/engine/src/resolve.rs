use std::collections::HashMap;

use decoder::Bitmap;
use model::{SampleSize, Tile, TileGrid};
use protocol::CanvasRegionTile;
use view::ContentTransformation;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedTiles {
    /// Base tile first, then the visible tiles of the active level nearest
    /// the viewport centre first.
    pub desired: Vec<Tile>,
    /// Paint order.
    pub renderable: Vec<CanvasRegionTile>,
}

/// Picks the level for the current zoom and projects its visible tiles.
///
/// The base tile is always desired. It is drawn underneath when nothing of
/// the active level is visible or when a visible tile is still missing its
/// bitmap; `preview` stands in for it until the base tile itself loads.
/// Visible tiles are desired centre outwards so the middle of the view
/// sharpens first, but drawn in row-major order.
///
/// # Panics
///
/// When the zoom asks for a sample size finer than the base that the grid has
/// no level for.
pub fn resolve_tiles(
    grid: &TileGrid,
    transformation: &ContentTransformation,
    loaded: &HashMap<Tile, Bitmap>,
    preview: Option<&Bitmap>,
) -> ResolvedTiles {
    let sample_size = SampleSize::for_zoom(transformation.scale().max_scale());
    let visible: Vec<CanvasRegionTile> = grid
        .foreground_tiles(sample_size)
        .iter()
        .filter(|tile| transformation.is_visible(tile.bounds))
        .map(|tile| project(transformation, *tile, loaded.get(tile), false))
        .collect();

    let base = grid.base();
    let show_base = visible.is_empty() || visible.iter().any(|tile| !tile.is_loaded());

    let mut by_distance: Vec<(f32, Tile)> = visible
        .iter()
        .map(|canvas_tile| {
            let tile = canvas_tile.tile;
            (distance_from_center(transformation, tile), tile)
        })
        .collect();
    // Stable, so equally distant tiles keep row-major order.
    by_distance.sort_by(|(a, _), (b, _)| a.total_cmp(b));
    let mut desired = Vec::with_capacity(visible.len() + 1);
    desired.push(base);
    desired.extend(by_distance.into_iter().map(|(_, tile)| tile));

    let mut renderable = Vec::with_capacity(visible.len() + 1);
    if show_base {
        let base_tile = match loaded.get(&base) {
            Some(bitmap) => project(transformation, base, Some(bitmap), false),
            None => project(transformation, base, preview, preview.is_some()),
        };
        renderable.push(base_tile);
    }
    renderable.extend(visible);

    ResolvedTiles {
        desired,
        renderable,
    }
}

fn project(
    transformation: &ContentTransformation,
    tile: Tile,
    bitmap: Option<&Bitmap>,
    preview: bool,
) -> CanvasRegionTile {
    CanvasRegionTile {
        tile,
        bitmap: bitmap.cloned(),
        preview,
        bounds: transformation
            .map_region(tile.bounds)
            .discard_fractional_values(),
    }
}

/// Screen distance from the viewport centre to the tile, zero when the tile
/// covers the centre.
fn distance_from_center(transformation: &ContentTransformation, tile: Tile) -> f32 {
    let viewport = transformation.viewport_size();
    let center_x = viewport.width as f32 / 2.0;
    let center_y = viewport.height as f32 / 2.0;
    let bounds = transformation.screen_bounds(tile.bounds);
    let dx = (bounds.left - center_x).max(center_x - bounds.right).max(0.0);
    let dy = (bounds.top - center_y).max(center_y - bounds.bottom).max(0.0);
    dx.hypot(dy)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use image::RgbaImage;
    use model::{IntRect, IntSize, Offset, ScaleFactor};

    const IMAGE: IntSize = IntSize::new(9_734, 3_265);
    const CANVAS: IntSize = IntSize::new(1080, 2214);

    fn grid() -> TileGrid {
        TileGrid::generate(CANVAS, IMAGE)
    }

    fn transformation(scale: f32, offset: Offset) -> ContentTransformation {
        ContentTransformation::new(ScaleFactor::uniform(scale), offset, CANVAS)
            .expect("valid transformation")
    }

    fn bitmap() -> Bitmap {
        Bitmap::new(RgbaImage::new(1, 1))
    }

    fn load(tiles: &[Tile]) -> HashMap<Tile, Bitmap> {
        tiles.iter().map(|tile| (*tile, bitmap())).collect()
    }

    #[test]
    fn fitted_image_only_needs_the_base_tile() {
        let grid = grid();
        let fit = ContentTransformation::fit_center(IMAGE, CANVAS).expect("fit");
        let resolved = resolve_tiles(&grid, &fit, &HashMap::new(), None);

        assert_eq!(resolved.desired, vec![grid.base()]);
        assert_eq!(resolved.renderable.len(), 1);
        assert_eq!(resolved.renderable[0].tile, grid.base());
        assert!(!resolved.renderable[0].is_loaded());
    }

    #[test]
    fn preview_stands_in_until_the_base_tile_loads() {
        let grid = grid();
        let fit = ContentTransformation::fit_center(IMAGE, CANVAS).expect("fit");
        let preview = bitmap();

        let resolved = resolve_tiles(&grid, &fit, &HashMap::new(), Some(&preview));
        assert_eq!(resolved.renderable[0].bitmap.as_ref(), Some(&preview));
        assert!(resolved.renderable[0].preview);
        assert!(resolved.renderable[0].is_drawn());
        assert!(!resolved.renderable[0].is_loaded());

        let loaded = load(&[grid.base()]);
        let resolved = resolve_tiles(&grid, &fit, &loaded, Some(&preview));
        assert_eq!(
            resolved.renderable[0].bitmap.as_ref(),
            loaded.get(&grid.base())
        );
        assert!(resolved.renderable[0].is_loaded());
    }

    #[test]
    fn full_resolution_shows_only_tiles_inside_the_viewport() {
        let grid = grid();
        let resolved = resolve_tiles(
            &grid,
            &transformation(1.0, Offset::ZERO),
            &HashMap::new(),
            None,
        );

        let visible: HashSet<Tile> = grid
            .foreground_tiles(SampleSize::FULL)
            .iter()
            .copied()
            .filter(|tile| tile.bounds.overlaps(IntRect::from_size(CANVAS)))
            .collect();
        assert!(!visible.is_empty());
        assert!(visible.len() < grid.foreground_tiles(SampleSize::FULL).len());
        assert_eq!(resolved.desired[0], grid.base());
        assert_eq!(resolved.desired.len(), visible.len() + 1);
        assert_eq!(
            resolved.desired[1..].iter().copied().collect::<HashSet<_>>(),
            visible
        );
    }

    #[test]
    fn tile_under_the_viewport_centre_is_desired_first() {
        let grid = grid();
        // Content x 3000..4080, y 200..2414 on screen; centre at (3540, 1307).
        let panned = transformation(1.0, Offset::new(-3_000.0, -200.0));
        let resolved = resolve_tiles(&grid, &panned, &HashMap::new(), None);

        let first = resolved.desired[1].bounds;
        assert!(first.left <= 3_540 && 3_540 < first.right, "{first:?}");
        assert!(first.top <= 1_307 && 1_307 < first.bottom, "{first:?}");

        let distances: Vec<f32> = resolved.desired[1..]
            .iter()
            .map(|tile| distance_from_center(&panned, *tile))
            .collect();
        assert_eq!(distances[0], 0.0);
        assert!(distances.windows(2).all(|pair| pair[0] <= pair[1]));

        // Drawing still goes row by row.
        let drawn: Vec<Tile> = resolved.renderable[1..]
            .iter()
            .map(|canvas_tile| canvas_tile.tile)
            .collect();
        assert_ne!(drawn[0], resolved.desired[1]);
    }

    #[test]
    fn base_tile_is_drawn_until_every_visible_tile_is_loaded() {
        let grid = grid();
        let zoomed = transformation(0.3, Offset::ZERO);
        let nothing_loaded = resolve_tiles(&grid, &zoomed, &HashMap::new(), None);
        let fine = &nothing_loaded.desired[1..];
        assert!(fine.len() > 1);
        assert!(fine.iter().all(|tile| tile.sample_size == SampleSize::new(2)));

        let mut partially = load(&fine[1..]);
        partially.insert(grid.base(), bitmap());
        let resolved = resolve_tiles(&grid, &zoomed, &partially, None);
        assert_eq!(resolved.renderable[0].tile, grid.base());
        assert_eq!(resolved.renderable.len(), fine.len() + 1);

        let mut fully = load(fine);
        fully.insert(grid.base(), bitmap());
        let resolved = resolve_tiles(&grid, &zoomed, &fully, None);
        assert_eq!(resolved.renderable.len(), fine.len());
        assert!(resolved.renderable.iter().all(CanvasRegionTile::is_loaded));
        // Still desired, so the cache keeps it for the next zoom out.
        assert_eq!(resolved.desired[0], grid.base());
    }

    #[test]
    fn renderable_tiles_keep_row_major_order() {
        let grid = grid();
        let resolved = resolve_tiles(
            &grid,
            &transformation(0.3, Offset::ZERO),
            &HashMap::new(),
            None,
        );
        let fine: Vec<IntRect> = resolved.renderable[1..]
            .iter()
            .map(|canvas_tile| canvas_tile.tile.bounds)
            .collect();
        let mut sorted = fine.clone();
        sorted.sort_by_key(|bounds| (bounds.top, bounds.left));
        assert_eq!(fine, sorted);
    }

    #[test]
    fn destinations_are_scaled_offset_and_floored() {
        let grid = grid();
        let resolved = resolve_tiles(
            &grid,
            &transformation(0.25, Offset::new(10.7, -3.2)),
            &HashMap::new(),
            None,
        );
        for canvas_tile in &resolved.renderable {
            let bounds = canvas_tile.tile.bounds;
            let expected = IntRect::new(
                (bounds.left as f32 * 0.25 + 10.7).floor() as i32,
                (bounds.top as f32 * 0.25 - 3.2).floor() as i32,
                (bounds.right as f32 * 0.25 + 10.7).floor() as i32,
                (bounds.bottom as f32 * 0.25 - 3.2).floor() as i32,
            );
            assert_eq!(canvas_tile.bounds, expected, "{}", canvas_tile.tile);
        }
    }

    #[test]
    fn content_panned_out_of_view_falls_back_to_the_base_tile() {
        let grid = grid();
        let resolved = resolve_tiles(
            &grid,
            &transformation(1.0, Offset::new(-20_000.0, 0.0)),
            &HashMap::new(),
            None,
        );
        assert_eq!(resolved.desired, vec![grid.base()]);
        assert_eq!(resolved.renderable.len(), 1);
    }

    #[test]
    fn rotation_decides_visibility_around_the_pivot() {
        let grid = grid();
        let upright = transformation(1.0, Offset::ZERO);
        let visible_upright = resolve_tiles(&grid, &upright, &HashMap::new(), None).desired;
        assert_eq!(visible_upright.len(), 3);

        // Half a turn about the origin swings the content out of the viewport.
        let rotated = upright
            .with_rotation(180.0, Offset::ZERO)
            .expect("valid rotation");
        let visible_rotated = resolve_tiles(&grid, &rotated, &HashMap::new(), None).desired;
        assert_eq!(visible_rotated, vec![grid.base()]);
    }
}
