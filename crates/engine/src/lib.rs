//! Viewport pipeline: picks the tiles a transformation needs, keeps the tile
//! cache in step and publishes what to draw.

pub mod mailbox;
pub mod pipeline;
pub mod resolve;

pub use mailbox::{MailboxConsumer, MailboxProducer, latest_mailbox};
pub use pipeline::{PipelineConfig, ViewportPipeline};
pub use resolve::{ResolvedTiles, resolve_tiles};
