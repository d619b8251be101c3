//! Region decoding: image sources, the decoder traits, cancellation and the
//! pooled decoder that lets several tiles decode at once.

pub mod bitmap;
pub mod cancel;
pub mod error;
pub mod pnm;
pub mod pool;
pub mod pooled;
pub mod region;
pub mod source;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use bitmap::Bitmap;
pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use error::{DecodeError, OpenError};
pub use pnm::{PnmDecoderFactory, PnmHeader, PnmHeaderError, PnmRegionDecoder, write_ppm_header};
pub use pool::{Lease, PoolConfig, ResourcePool};
pub use pooled::PooledRegionDecoder;
pub use region::{DecodeRequest, RegionDecoder, RegionDecoderFactory, validate_region};
pub use source::{ImageSource, ReadSeek};
