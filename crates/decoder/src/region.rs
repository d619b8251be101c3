use model::{IntRect, IntSize, SampleSize};

use crate::bitmap::Bitmap;
use crate::cancel::CancelToken;
use crate::error::{DecodeError, OpenError};
use crate::source::ImageSource;

#[derive(Debug, Clone, Copy)]
pub struct DecodeRequest<'a> {
    /// Full resolution source pixels.
    pub region: IntRect,
    pub sample_size: SampleSize,
    pub cancel: &'a CancelToken,
}

impl DecodeRequest<'_> {
    /// Size of the bitmap a decoder returns for this request.
    pub fn output_size(&self) -> IntSize {
        let sample_size = self.sample_size.get();
        let size = self.region.size();
        IntSize::new(
            size.width.div_ceil(sample_size),
            size.height.div_ceil(sample_size),
        )
    }
}

/// Decodes rectangular regions of one opened image. An instance serves one
/// request at a time; parallelism comes from pooling several instances.
pub trait RegionDecoder: Send {
    fn image_size(&self) -> IntSize;

    fn decode_region(&mut self, request: &DecodeRequest<'_>) -> Result<Bitmap, DecodeError>;
}

pub trait RegionDecoderFactory: Send + Sync {
    fn create(&self, source: &ImageSource) -> Result<Box<dyn RegionDecoder>, OpenError>;
}

impl<F> RegionDecoderFactory for F
where
    F: Fn(&ImageSource) -> Result<Box<dyn RegionDecoder>, OpenError> + Send + Sync,
{
    fn create(&self, source: &ImageSource) -> Result<Box<dyn RegionDecoder>, OpenError> {
        self(source)
    }
}

/// Checks a requested region against the image before any decoding work.
pub fn validate_region(region: IntRect, image_size: IntSize) -> Result<(), DecodeError> {
    if region.is_empty() {
        return Err(DecodeError::EmptyRegion(region));
    }
    if !IntRect::from_size(image_size).contains_rect(region) {
        return Err(DecodeError::RegionOutOfBounds { region, image_size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_size_rounds_partial_samples_up() {
        let cancel = CancelToken::never();
        let request = DecodeRequest {
            region: IntRect::new(0, 0, 9_734, 3_265),
            sample_size: SampleSize::new(8),
            cancel: &cancel,
        };
        assert_eq!(request.output_size(), IntSize::new(1_217, 409));
    }

    #[test]
    fn regions_must_lie_inside_the_image() {
        let image_size = IntSize::new(100, 50);
        assert!(validate_region(IntRect::new(0, 0, 100, 50), image_size).is_ok());
        assert!(matches!(
            validate_region(IntRect::new(10, 10, 10, 20), image_size),
            Err(DecodeError::EmptyRegion(_))
        ));
        assert!(matches!(
            validate_region(IntRect::new(90, 0, 101, 10), image_size),
            Err(DecodeError::RegionOutOfBounds { .. })
        ));
    }
}
