use std::fmt;

use crate::geometry::IntSize;

/// Upper bound for the doubling loop. Region decoders cannot skip more than
/// this many pixels per sample in practice.
const MAX_SAMPLE_SIZE: u32 = 1 << 30;

/// Decode only 1 out of every `N` pixels along each axis. Region decoders
/// expect values based on powers of two, so only `1` or even values are
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleSize(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSizeError {
    Zero,
    Odd(u32),
}

impl fmt::Display for SampleSizeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleSizeError::Zero => write!(formatter, "sample size must be at least 1"),
            SampleSizeError::Odd(value) => write!(
                formatter,
                "incorrect sample size {value}: region decoders require values based on powers of 2"
            ),
        }
    }
}

impl std::error::Error for SampleSizeError {}

impl SampleSize {
    pub const FULL: SampleSize = SampleSize(1);

    pub fn try_new(value: u32) -> Result<Self, SampleSizeError> {
        if value == 0 {
            return Err(SampleSizeError::Zero);
        }
        if value != 1 && value % 2 != 0 {
            return Err(SampleSizeError::Odd(value));
        }
        Ok(Self(value))
    }

    /// Panics on values a region decoder can't use; a bad sample size means
    /// the grid and the transform disagree.
    pub fn new(value: u32) -> Self {
        match Self::try_new(value) {
            Ok(sample_size) => sample_size,
            Err(error) => panic!("{error}"),
        }
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Next finer level, or `None` at full resolution.
    pub fn finer(self) -> Option<SampleSize> {
        if self.0 < 2 {
            None
        } else {
            Some(SampleSize::new(self.0 / 2))
        }
    }

    /// Sample size for drawing the image at `zoom` (screen pixels per source
    /// pixel). Zero, negative and non-finite zooms fall back to full
    /// resolution.
    pub fn for_zoom(zoom: f32) -> SampleSize {
        if !zoom.is_finite() || zoom <= 0.0 {
            return SampleSize::FULL;
        }
        let inverse_zoom = 1.0 / zoom as f64;
        let mut sample_size: u32 = 1;
        while sample_size < MAX_SAMPLE_SIZE && (sample_size as f64) * 2.0 < inverse_zoom {
            sample_size *= 2;
        }
        SampleSize(sample_size)
    }
}

impl fmt::Display for SampleSize {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "1/{}", self.0)
    }
}

/// Sample size for fitting an image of `scaled_image_size` inside
/// `viewport_size`.
pub fn calculate_sample_size(viewport_size: IntSize, scaled_image_size: IntSize) -> SampleSize {
    if viewport_size.is_empty() || scaled_image_size.is_empty() {
        return SampleSize::FULL;
    }
    let zoom = (viewport_size.width as f32 / scaled_image_size.width as f32)
        .min(viewport_size.height as f32 / scaled_image_size.height as f32);
    SampleSize::for_zoom(zoom)
}
