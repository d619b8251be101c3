use std::panic::{AssertUnwindSafe, catch_unwind};

use image::imageops;
use model::{ImageOrientation, IntRect, IntSize, SampleSize};
use tracing::{debug, trace};

use crate::bitmap::Bitmap;
use crate::cancel::CancelToken;
use crate::error::{DecodeError, OpenError};
use crate::pool::{PoolConfig, ResourcePool};
use crate::region::{DecodeRequest, RegionDecoder, RegionDecoderFactory, validate_region};
use crate::source::ImageSource;

/// Several decoder instances for one image, lent out to concurrent callers.
///
/// Regions are expressed in upright coordinates; the source orientation is
/// undone before the request reaches an instance and applied again to the
/// decoded pixels.
pub struct PooledRegionDecoder {
    image_size: IntSize,
    orientation: ImageOrientation,
    decoders: ResourcePool<Box<dyn RegionDecoder>>,
}

impl PooledRegionDecoder {
    pub fn open(
        factory: &dyn RegionDecoderFactory,
        source: &ImageSource,
        config: &PoolConfig,
    ) -> Result<Self, OpenError> {
        let decoder_count = config.decoder_count();
        let mut decoders = Vec::with_capacity(decoder_count);
        for _ in 0..decoder_count {
            decoders.push(factory.create(source)?);
        }

        let raw_size = decoders[0].image_size();
        if raw_size.is_empty() {
            return Err(OpenError::EmptyImage {
                source_description: source.to_string(),
            });
        }
        if let Some(mismatch) = decoders.iter().find(|d| d.image_size() != raw_size) {
            return Err(OpenError::unsupported(
                source.to_string(),
                format!(
                    "decoder instances disagree on the image size: {} vs {}",
                    raw_size,
                    mismatch.image_size()
                ),
            ));
        }

        let orientation = source.orientation();
        debug!(
            target: "decoder",
            source = %source,
            %raw_size,
            ?orientation,
            decoder_count,
            "opened pooled region decoder"
        );
        Ok(Self {
            image_size: orientation.oriented_size(raw_size),
            orientation,
            decoders: ResourcePool::new(decoders),
        })
    }

    /// Upright image size.
    pub fn image_size(&self) -> IntSize {
        self.image_size
    }

    pub fn orientation(&self) -> ImageOrientation {
        self.orientation
    }

    pub fn pool_size(&self) -> usize {
        self.decoders.size()
    }

    pub fn idle_decoders(&self) -> usize {
        self.decoders.available()
    }

    /// Blocks until an instance is free. A cancelled token aborts both the
    /// wait and, for cooperative decoders, the decode itself.
    pub fn decode(
        &self,
        region: IntRect,
        sample_size: SampleSize,
        cancel: &CancelToken,
    ) -> Result<Bitmap, DecodeError> {
        validate_region(region, self.image_size)?;
        let raw_region = self.orientation.to_raw_region(region, self.image_size);

        let mut decoder = self.decoders.borrow(cancel)?;
        let request = DecodeRequest {
            region: raw_region,
            sample_size,
            cancel,
        };
        let decoded = catch_unwind(AssertUnwindSafe(|| decoder.decode_region(&request)))
            .map_err(|payload| DecodeError::Panicked(panic_message(payload.as_ref())))??;
        drop(decoder);

        if cancel.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }
        trace!(target: "decoder", ?region, %sample_size, "decoded region");
        Ok(orient(decoded, self.orientation))
    }
}

fn orient(bitmap: Bitmap, orientation: ImageOrientation) -> Bitmap {
    match orientation {
        ImageOrientation::None => bitmap,
        ImageOrientation::Rotate90 => Bitmap::new(imageops::rotate90(bitmap.pixels())),
        ImageOrientation::Rotate180 => Bitmap::new(imageops::rotate180(bitmap.pixels())),
        ImageOrientation::Rotate270 => Bitmap::new(imageops::rotate270(bitmap.pixels())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use image::{Rgba, RgbaImage};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Paints every pixel with its raw coordinates so tests can tell which
    /// source pixel ended up where.
    struct CoordinateDecoder {
        size: IntSize,
    }

    impl RegionDecoder for CoordinateDecoder {
        fn image_size(&self) -> IntSize {
            self.size
        }

        fn decode_region(&mut self, request: &DecodeRequest<'_>) -> Result<Bitmap, DecodeError> {
            if request.region.left < 0 {
                panic!("negative region");
            }
            let output = request.output_size();
            let sample = request.sample_size.get();
            let pixels = RgbaImage::from_fn(output.width, output.height, |x, y| {
                let source_x = request.region.left as u32 + x * sample;
                let source_y = request.region.top as u32 + y * sample;
                Rgba([source_x as u8, source_y as u8, 0, 255])
            });
            Ok(Bitmap::new(pixels))
        }
    }

    fn coordinate_factory(size: IntSize, created: Arc<AtomicUsize>) -> impl RegionDecoderFactory {
        move |_: &ImageSource| -> Result<Box<dyn RegionDecoder>, OpenError> {
            created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CoordinateDecoder { size }))
        }
    }

    fn source() -> ImageSource {
        ImageSource::bytes("fake", Vec::<u8>::new())
    }

    fn config(decoders: usize) -> PoolConfig {
        PoolConfig {
            min_decoders: decoders,
            max_decoders: Some(decoders),
        }
    }

    #[test]
    fn opens_one_instance_per_pool_slot() {
        let created = Arc::new(AtomicUsize::new(0));
        let factory = coordinate_factory(IntSize::new(40, 20), created.clone());
        let pooled = PooledRegionDecoder::open(&factory, &source(), &config(3)).expect("open");
        assert_eq!(created.load(Ordering::SeqCst), 3);
        assert_eq!(pooled.pool_size(), 3);
        assert_eq!(pooled.image_size(), IntSize::new(40, 20));
    }

    #[test]
    fn subsamples_the_requested_region() {
        let factory = coordinate_factory(IntSize::new(40, 20), Arc::default());
        let pooled = PooledRegionDecoder::open(&factory, &source(), &config(2)).expect("open");
        let bitmap = pooled
            .decode(
                IntRect::new(10, 4, 15, 8),
                SampleSize::new(2),
                &CancelToken::never(),
            )
            .expect("decode");
        assert_eq!(bitmap.size(), IntSize::new(3, 2));
        assert_eq!(bitmap.pixels().get_pixel(2, 1), &Rgba([14, 6, 0, 255]));
    }

    #[test]
    fn orientation_is_undone_before_decoding_and_reapplied_after() {
        let factory = coordinate_factory(IntSize::new(40, 20), Arc::default());
        let source = source().with_orientation(ImageOrientation::Rotate90);
        let pooled = PooledRegionDecoder::open(&factory, &source, &config(2)).expect("open");
        assert_eq!(pooled.image_size(), IntSize::new(20, 40));

        // Top left of the upright image is the bottom left of the raw pixels.
        let bitmap = pooled
            .decode(IntRect::new(0, 0, 2, 1), SampleSize::FULL, &CancelToken::never())
            .expect("decode");
        assert_eq!(bitmap.size(), IntSize::new(2, 1));
        assert_eq!(bitmap.pixels().get_pixel(0, 0), &Rgba([0, 19, 0, 255]));
        assert_eq!(bitmap.pixels().get_pixel(1, 0), &Rgba([0, 18, 0, 255]));
    }

    #[test]
    fn rejects_regions_outside_the_upright_image() {
        let factory = coordinate_factory(IntSize::new(40, 20), Arc::default());
        let pooled = PooledRegionDecoder::open(&factory, &source(), &config(2)).expect("open");
        let outcome = pooled.decode(
            IntRect::new(30, 0, 41, 10),
            SampleSize::FULL,
            &CancelToken::never(),
        );
        assert!(matches!(outcome, Err(DecodeError::RegionOutOfBounds { .. })));
    }

    #[test]
    fn cancelled_requests_leave_every_instance_in_the_pool() {
        let factory = coordinate_factory(IntSize::new(40, 20), Arc::default());
        let pooled = PooledRegionDecoder::open(&factory, &source(), &config(2)).expect("open");
        let (handle, token) = cancel_pair();
        handle.cancel();
        let outcome = pooled.decode(IntRect::new(0, 0, 10, 10), SampleSize::FULL, &token);
        assert!(matches!(outcome, Err(DecodeError::Cancelled)));
        assert_eq!(pooled.idle_decoders(), 2);
    }

    #[test]
    fn open_failures_propagate() {
        let factory = |source: &ImageSource| -> Result<Box<dyn RegionDecoder>, OpenError> {
            Err(OpenError::unsupported(source.to_string(), "not an image"))
        };
        let error = PooledRegionDecoder::open(&factory, &source(), &config(2))
            .err()
            .expect("open must fail");
        assert!(error.to_string().contains("fake (0 bytes in memory)"));
    }

    #[test]
    fn empty_images_are_rejected() {
        let factory = coordinate_factory(IntSize::new(0, 20), Arc::default());
        let error = PooledRegionDecoder::open(&factory, &source(), &config(2))
            .err()
            .expect("open must fail");
        assert!(matches!(error, OpenError::EmptyImage { .. }));
    }
}
