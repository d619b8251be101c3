//! Integer and float geometry shared by the grid generator, the resolver and
//! the decoders.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IntSize {
    pub width: u32,
    pub height: u32,
}

impl IntSize {
    pub const ZERO: IntSize = IntSize {
        width: 0,
        height: 0,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn min_dimension(self) -> u32 {
        self.width.min(self.height)
    }

    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width and height swapped, used for quarter-turn orientations.
    pub const fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

impl std::fmt::Display for IntSize {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntSizeParseError {
    MissingSeparator,
    InvalidNumber,
}

impl std::fmt::Display for IntSizeParseError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntSizeParseError::MissingSeparator => {
                write!(formatter, "size must be written as <width>x<height>")
            }
            IntSizeParseError::InvalidNumber => {
                write!(formatter, "size dimensions must be unsigned integers")
            }
        }
    }
}

impl std::error::Error for IntSizeParseError {}

impl std::str::FromStr for IntSize {
    type Err = IntSizeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (width, height) = value
            .split_once(['x', 'X'])
            .ok_or(IntSizeParseError::MissingSeparator)?;
        let width = width
            .trim()
            .parse()
            .map_err(|_| IntSizeParseError::InvalidNumber)?;
        let height = height
            .trim()
            .parse()
            .map_err(|_| IntSizeParseError::InvalidNumber)?;
        Ok(Self { width, height })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IntOffset {
    pub x: i32,
    pub y: i32,
}

impl IntOffset {
    pub const ZERO: IntOffset = IntOffset { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Half-open integer rectangle: `left..right` by `top..bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IntRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IntRect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_origin_size(origin: IntOffset, size: IntSize) -> Self {
        let width = i32::try_from(size.width).expect("rect width exceeds i32 range");
        let height = i32::try_from(size.height).expect("rect height exceeds i32 range");
        Self {
            left: origin.x,
            top: origin.y,
            right: origin
                .x
                .checked_add(width)
                .expect("rect right edge overflow"),
            bottom: origin
                .y
                .checked_add(height)
                .expect("rect bottom edge overflow"),
        }
    }

    /// Rectangle anchored at the origin covering `size`.
    pub fn from_size(size: IntSize) -> Self {
        Self::from_origin_size(IntOffset::ZERO, size)
    }

    pub const fn width(self) -> i32 {
        self.right - self.left
    }

    pub const fn height(self) -> i32 {
        self.bottom - self.top
    }

    pub const fn top_left(self) -> IntOffset {
        IntOffset {
            x: self.left,
            y: self.top,
        }
    }

    pub fn size(self) -> IntSize {
        IntSize {
            width: self.width().max(0) as u32,
            height: self.height().max(0) as u32,
        }
    }

    pub const fn is_empty(self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    pub fn area(self) -> u64 {
        self.size().area()
    }

    /// True when the two rectangles share a region of positive area.
    pub const fn overlaps(self, other: IntRect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    pub const fn contains_rect(self, other: IntRect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    pub fn to_rect(self) -> Rect {
        Rect {
            left: self.left as f32,
            top: self.top as f32,
            right: self.right as f32,
            bottom: self.bottom as f32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

impl Offset {
    pub const ZERO: Offset = Offset { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    pub x: f32,
    pub y: f32,
}

impl ScaleFactor {
    pub const IDENTITY: ScaleFactor = ScaleFactor { x: 1.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub const fn uniform(scale: f32) -> Self {
        Self { x: scale, y: scale }
    }

    pub fn max_scale(self) -> f32 {
        self.x.max(self.y)
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(self) -> f32 {
        self.right - self.left
    }

    pub fn height(self) -> f32 {
        self.bottom - self.top
    }

    /// Canvas APIs draw at integer positions. Every edge is floored, so two
    /// tiles sharing an edge value always land on the same pixel column and
    /// never open a gap between them.
    pub fn discard_fractional_values(self) -> IntRect {
        IntRect {
            left: self.left.floor() as i32,
            top: self.top.floor() as i32,
            right: self.right.floor() as i32,
            bottom: self.bottom.floor() as i32,
        }
    }

    /// Strict overlap with `(0, 0)..size`. A rectangle that only touches an
    /// edge of the area does not overlap it.
    pub fn overlaps_size(self, size: IntSize) -> bool {
        if self.right <= 0.0 || size.width as f32 <= self.left {
            return false;
        }
        if self.bottom <= 0.0 || size.height as f32 <= self.top {
            return false;
        }
        true
    }

    pub fn corners(self) -> [Offset; 4] {
        [
            Offset::new(self.left, self.top),
            Offset::new(self.right, self.top),
            Offset::new(self.right, self.bottom),
            Offset::new(self.left, self.bottom),
        ]
    }

    /// Smallest rectangle containing every point.
    pub fn bounding(points: &[Offset]) -> Self {
        assert!(!points.is_empty(), "bounding rect needs at least one point");
        let mut bounds = Rect::new(points[0].x, points[0].y, points[0].x, points[0].y);
        for point in &points[1..] {
            bounds.left = bounds.left.min(point.x);
            bounds.top = bounds.top.min(point.y);
            bounds.right = bounds.right.max(point.x);
            bounds.bottom = bounds.bottom.max(point.y);
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_rects_do_not_overlap() {
        let left = IntRect::new(0, 0, 10, 10);
        let right = IntRect::new(10, 0, 20, 10);
        assert!(!left.overlaps(right));
        assert!(left.overlaps(IntRect::new(9, 9, 11, 11)));
    }

    #[test]
    fn overlaps_size_uses_strict_edges() {
        let viewport = IntSize::new(100, 50);
        assert!(!Rect::new(-20.0, 0.0, 0.0, 10.0).overlaps_size(viewport));
        assert!(!Rect::new(100.0, 0.0, 120.0, 10.0).overlaps_size(viewport));
        assert!(!Rect::new(0.0, 50.0, 10.0, 60.0).overlaps_size(viewport));
        assert!(Rect::new(-20.0, -5.0, 0.5, 0.5).overlaps_size(viewport));
    }

    #[test]
    fn discarding_fractions_keeps_shared_edges_aligned() {
        let first = Rect::new(-10.4, 0.0, 33.3, 10.0).discard_fractional_values();
        let second = Rect::new(33.3, 0.0, 76.9, 10.0).discard_fractional_values();
        assert_eq!(first.right, second.left);
        assert_eq!(first.left, -11);
    }

    #[test]
    fn parses_sizes_written_with_an_x() {
        assert_eq!("1080x2214".parse::<IntSize>(), Ok(IntSize::new(1080, 2214)));
        assert_eq!(
            "1080".parse::<IntSize>(),
            Err(IntSizeParseError::MissingSeparator)
        );
        assert_eq!(
            "axb".parse::<IntSize>(),
            Err(IntSizeParseError::InvalidNumber)
        );
    }
}
