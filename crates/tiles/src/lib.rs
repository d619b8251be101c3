//! Tile bitmap cache: decides which tiles to decode, runs the decodes and
//! publishes the bitmaps that are ready.

mod cache;
pub mod lifecycle;
pub mod throttle;

pub use cache::{CacheSnapshot, TileCache, TileCacheConfig};
pub use lifecycle::{CompletionOutcome, DecodeJob, DecodeTicket, ReconcilePlan, TileCacheState};
pub use throttle::{LatestThrottle, ThrottleDecision};
