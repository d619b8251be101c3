//! Snapshot of how the image content is laid out on screen.
//!
//! Content pixels are scaled, then offset, then the whole layer is rotated
//! about a pivot. Tiles are drawn at their unrotated destination and the
//! rendering layer applies the rotation once for the whole layer.

use model::{IntRect, IntSize, Offset, Rect, ScaleFactor};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentTransformation {
    scale: ScaleFactor,
    offset: Offset,
    rotation_degrees: f32,
    rotation_pivot: Offset,
    viewport_size: IntSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationError {
    InvalidScale,
    InvalidViewport,
    NonFiniteValue,
}

impl std::fmt::Display for TransformationError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformationError::InvalidScale => {
                write!(formatter, "scale must be finite and greater than zero")
            }
            TransformationError::InvalidViewport => {
                write!(formatter, "viewport must have a non-zero width and height")
            }
            TransformationError::NonFiniteValue => {
                write!(formatter, "transformation produced a non-finite value")
            }
        }
    }
}

impl std::error::Error for TransformationError {}

impl ContentTransformation {
    pub fn new(
        scale: ScaleFactor,
        offset: Offset,
        viewport_size: IntSize,
    ) -> Result<Self, TransformationError> {
        validate_scale(scale)?;
        if !offset.is_finite() {
            return Err(TransformationError::NonFiniteValue);
        }
        if viewport_size.is_empty() {
            return Err(TransformationError::InvalidViewport);
        }
        Ok(Self {
            scale,
            offset,
            rotation_degrees: 0.0,
            rotation_pivot: Offset::ZERO,
            viewport_size,
        })
    }

    /// Scales `image_size` down (or up) to fit the viewport and centers it.
    pub fn fit_center(
        image_size: IntSize,
        viewport_size: IntSize,
    ) -> Result<Self, TransformationError> {
        if viewport_size.is_empty() || image_size.is_empty() {
            return Err(TransformationError::InvalidViewport);
        }
        let scale = (viewport_size.width as f32 / image_size.width as f32)
            .min(viewport_size.height as f32 / image_size.height as f32);
        let offset = Offset::new(
            (viewport_size.width as f32 - image_size.width as f32 * scale) / 2.0,
            (viewport_size.height as f32 - image_size.height as f32 * scale) / 2.0,
        );
        Self::new(ScaleFactor::uniform(scale), offset, viewport_size)
    }

    pub fn with_rotation(
        self,
        degrees: f32,
        pivot: Offset,
    ) -> Result<Self, TransformationError> {
        if !degrees.is_finite() || !pivot.is_finite() {
            return Err(TransformationError::NonFiniteValue);
        }
        Ok(Self {
            rotation_degrees: degrees,
            rotation_pivot: pivot,
            ..self
        })
    }

    /// Zooms by `zoom_factor` while keeping `anchor` at the same screen position.
    pub fn zoomed_about(
        self,
        zoom_factor: f32,
        anchor: Offset,
    ) -> Result<Self, TransformationError> {
        if !zoom_factor.is_finite() || zoom_factor <= 0.0 {
            return Err(TransformationError::InvalidScale);
        }
        if !anchor.is_finite() {
            return Err(TransformationError::NonFiniteValue);
        }

        let scale = ScaleFactor::new(
            checked_mul(self.scale.x, zoom_factor)?,
            checked_mul(self.scale.y, zoom_factor)?,
        );
        validate_scale(scale)?;

        let keep_anchor_scale = checked_add(1.0, -zoom_factor)?;
        let offset = Offset::new(
            checked_add(
                checked_mul(self.offset.x, zoom_factor)?,
                checked_mul(anchor.x, keep_anchor_scale)?,
            )?,
            checked_add(
                checked_mul(self.offset.y, zoom_factor)?,
                checked_mul(anchor.y, keep_anchor_scale)?,
            )?,
        );
        Ok(Self {
            scale,
            offset,
            ..self
        })
    }

    pub fn scale(&self) -> ScaleFactor {
        self.scale
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    pub fn rotation_degrees(&self) -> f32 {
        self.rotation_degrees
    }

    pub fn rotation_pivot(&self) -> Offset {
        self.rotation_pivot
    }

    pub fn viewport_size(&self) -> IntSize {
        self.viewport_size
    }

    /// Content to screen, rotation included.
    pub fn to_matrix3x3(&self) -> [[f32; 3]; 3] {
        let radians = self.rotation_degrees.to_radians();
        let sine = radians.sin();
        let cosine = radians.cos();

        let m00 = self.scale.x * cosine;
        let m01 = self.scale.y * -sine;
        let m10 = self.scale.x * sine;
        let m11 = self.scale.y * cosine;

        let pivot = self.rotation_pivot;
        let from_pivot_x = self.offset.x - pivot.x;
        let from_pivot_y = self.offset.y - pivot.y;
        let tx = cosine * from_pivot_x - sine * from_pivot_y + pivot.x;
        let ty = sine * from_pivot_x + cosine * from_pivot_y + pivot.y;

        [[m00, m01, tx], [m10, m11, ty], [0.0, 0.0, 1.0]]
    }

    /// Unrotated draw destination of a content region: `bounds * scale + offset`.
    pub fn map_region(&self, region: IntRect) -> Rect {
        Rect::new(
            region.left as f32 * self.scale.x + self.offset.x,
            region.top as f32 * self.scale.y + self.offset.y,
            region.right as f32 * self.scale.x + self.offset.x,
            region.bottom as f32 * self.scale.y + self.offset.y,
        )
    }

    /// Axis-aligned screen bounds of a content region after rotation.
    pub fn screen_bounds(&self, region: IntRect) -> Rect {
        if self.rotation_degrees == 0.0 {
            return self.map_region(region);
        }
        let matrix = self.to_matrix3x3();
        let corners = region.to_rect().corners().map(|corner| {
            Offset::new(
                matrix[0][0] * corner.x + matrix[0][1] * corner.y + matrix[0][2],
                matrix[1][0] * corner.x + matrix[1][1] * corner.y + matrix[1][2],
            )
        });
        Rect::bounding(&corners)
    }

    /// A region touching the viewport only along an edge is not visible.
    pub fn is_visible(&self, region: IntRect) -> bool {
        self.screen_bounds(region).overlaps_size(self.viewport_size)
    }
}

fn validate_scale(scale: ScaleFactor) -> Result<(), TransformationError> {
    if !scale.x.is_finite() || !scale.y.is_finite() || scale.x <= 0.0 || scale.y <= 0.0 {
        return Err(TransformationError::InvalidScale);
    }
    Ok(())
}

fn checked_add(current: f32, delta: f32) -> Result<f32, TransformationError> {
    if !delta.is_finite() {
        return Err(TransformationError::NonFiniteValue);
    }
    let next = current + delta;
    if !next.is_finite() {
        return Err(TransformationError::NonFiniteValue);
    }
    Ok(next)
}

fn checked_mul(left: f32, right: f32) -> Result<f32, TransformationError> {
    if !left.is_finite() || !right.is_finite() {
        return Err(TransformationError::NonFiniteValue);
    }
    let next = left * right;
    if !next.is_finite() {
        return Err(TransformationError::NonFiniteValue);
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> IntSize {
        IntSize::new(1080, 2214)
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-2,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn zoom_about_anchor_keeps_anchor_screen_position() {
        let panned = Offset::new(20.0, -10.0);
        let transformation = ContentTransformation::new(ScaleFactor::IDENTITY, panned, viewport())
            .and_then(|t| t.zoomed_about(2.0, Offset::new(100.0, 50.0)))
            .expect("zoom about anchor");

        assert_close(transformation.scale().x, 2.0);
        assert_close(transformation.offset().x, -60.0);
        assert_close(transformation.offset().y, -70.0);
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert_eq!(
            ContentTransformation::new(ScaleFactor::uniform(0.0), Offset::ZERO, viewport()),
            Err(TransformationError::InvalidScale)
        );
        assert_eq!(
            ContentTransformation::new(ScaleFactor::IDENTITY, Offset::ZERO, IntSize::new(0, 5)),
            Err(TransformationError::InvalidViewport)
        );
        let transformation =
            ContentTransformation::new(ScaleFactor::IDENTITY, Offset::ZERO, viewport())
                .expect("transformation");
        assert_eq!(
            transformation.zoomed_about(1.2, Offset::new(f32::NAN, 20.0)),
            Err(TransformationError::NonFiniteValue)
        );
        assert_eq!(
            transformation.with_rotation(f32::INFINITY, Offset::ZERO),
            Err(TransformationError::NonFiniteValue)
        );
    }

    #[test]
    fn fit_center_letterboxes_wide_images() {
        let transformation =
            ContentTransformation::fit_center(IntSize::new(9_734, 3_265), viewport())
                .expect("fit");
        let bounds = transformation.map_region(IntRect::new(0, 0, 9_734, 3_265));
        assert_close(bounds.left, 0.0);
        assert_close(bounds.right, 1080.0);
        assert!(bounds.top > 0.0);
        assert_close(bounds.top + bounds.bottom, 2214.0);
    }

    #[test]
    fn maps_regions_with_scale_and_offset() {
        let transformation = ContentTransformation::new(
            ScaleFactor::new(0.5, 0.25),
            Offset::new(10.0, -4.0),
            viewport(),
        )
        .expect("transformation");
        assert_eq!(
            transformation.map_region(IntRect::new(100, 100, 300, 500)),
            Rect::new(60.0, 21.0, 160.0, 121.0)
        );
    }

    #[test]
    fn regions_touching_the_viewport_edge_are_not_visible() {
        let transformation =
            ContentTransformation::new(ScaleFactor::IDENTITY, Offset::ZERO, IntSize::new(100, 100))
                .expect("transformation");
        assert!(transformation.is_visible(IntRect::new(99, 0, 120, 10)));
        assert!(!transformation.is_visible(IntRect::new(100, 0, 120, 10)));
        assert!(!transformation.is_visible(IntRect::new(-20, 0, 0, 10)));
    }

    #[test]
    fn rotation_brings_regions_into_view() {
        let transformation =
            ContentTransformation::new(ScaleFactor::IDENTITY, Offset::ZERO, IntSize::new(100, 100))
                .expect("transformation");
        // Above the viewport until rotated a quarter turn about the origin.
        let region = IntRect::new(10, -60, 30, -40);
        assert!(!transformation.is_visible(region));

        let clockwise = transformation
            .with_rotation(90.0, Offset::ZERO)
            .expect("rotation");
        assert!(clockwise.is_visible(region));
        let counter_clockwise = transformation
            .with_rotation(-90.0, Offset::ZERO)
            .expect("rotation");
        assert!(!counter_clockwise.is_visible(region));
    }

    #[test]
    fn matrix_rotates_about_the_pivot() {
        let transformation = ContentTransformation::new(
            ScaleFactor::uniform(2.0),
            Offset::new(10.0, 0.0),
            viewport(),
        )
        .and_then(|t| t.with_rotation(180.0, Offset::new(100.0, 100.0)))
        .expect("transformation");
        let matrix = transformation.to_matrix3x3();
        // Content (0, 0) lands at (10, 0) before rotation; half a turn about
        // (100, 100) moves it to (190, 200).
        assert_close(matrix[0][2], 190.0);
        assert_close(matrix[1][2], 200.0);
        assert_close(matrix[0][0], -2.0);
        assert_close(matrix[1][1], -2.0);

        let bounds = transformation.screen_bounds(IntRect::new(0, 0, 10, 10));
        assert_close(bounds.left, 170.0);
        assert_close(bounds.top, 180.0);
        assert_close(bounds.right, 190.0);
        assert_close(bounds.bottom, 200.0);
    }
}
