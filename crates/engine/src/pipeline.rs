use std::sync::Arc;
use std::thread::JoinHandle;

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, never, select, unbounded};
use decoder::{Bitmap, ImageSource, PoolConfig, PooledRegionDecoder, RegionDecoderFactory};
use model::{IntSize, Tile, TileGrid};
use protocol::{ImageEvent, RenderSnapshot};
use serde::{Deserialize, Serialize};
use tiles::{TileCache, TileCacheConfig};
use tracing::{debug, info, warn};
use view::ContentTransformation;

use crate::mailbox::{MailboxConsumer, MailboxProducer, latest_mailbox};
use crate::resolve::resolve_tiles;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pool: PoolConfig,
    pub cache: TileCacheConfig,
}

enum ControlMessage {
    SetSource(ImageSource),
    CloseSource,
    SetCanvasSize(IntSize),
    Flush(Sender<()>),
    Shutdown,
}

/// Owns the pipeline thread that turns transformations into draw lists.
///
/// Every method returns immediately; results arrive through
/// [`render_snapshot`](Self::render_snapshot), [`render_updates`](Self::render_updates)
/// and [`events`](Self::events). Dropping the pipeline closes the open image
/// and joins every thread it started.
pub struct ViewportPipeline {
    control: Sender<ControlMessage>,
    transformations: MailboxProducer<ContentTransformation>,
    snapshot: Arc<ArcSwap<RenderSnapshot>>,
    render_updates: Receiver<()>,
    events: Receiver<ImageEvent>,
    thread: Option<JoinHandle<()>>,
}

impl ViewportPipeline {
    pub fn spawn(factory: Arc<dyn RegionDecoderFactory>, config: PipelineConfig) -> Self {
        let (control, control_receiver) = unbounded();
        let (transformations, transformation_consumer) = latest_mailbox();
        let (render_update_sender, render_updates) = bounded(1);
        let (event_sender, events) = unbounded();
        let snapshot = Arc::new(ArcSwap::from_pointee(RenderSnapshot::default()));

        let worker = PipelineWorker {
            factory,
            config,
            image: None,
            canvas_size: None,
            grid: None,
            transformation: None,
            last_desired: Vec::new(),
            snapshot: snapshot.clone(),
            render_updates: render_update_sender,
            events: event_sender,
        };
        let thread = std::thread::Builder::new()
            .name("viewport-pipeline".to_string())
            .spawn(move || worker.run(control_receiver, transformation_consumer))
            .unwrap_or_else(|error| panic!("failed to spawn viewport pipeline thread: {error}"));

        Self {
            control,
            transformations,
            snapshot,
            render_updates,
            events,
            thread: Some(thread),
        }
    }

    /// Closes the current image, then opens `source`.
    pub fn set_source(&self, source: ImageSource) {
        self.send(ControlMessage::SetSource(source));
    }

    pub fn close_source(&self) {
        self.send(ControlMessage::CloseSource);
    }

    /// Regenerates the tile grid. An empty canvas hides everything until a
    /// non-empty size arrives.
    pub fn set_canvas_size(&self, canvas_size: IntSize) {
        self.send(ControlMessage::SetCanvasSize(canvas_size));
    }

    /// Never blocks. Only the newest transformation not yet picked up by the
    /// pipeline thread is kept.
    pub fn push_transformation(&self, transformation: ContentTransformation) {
        self.transformations.push(transformation);
    }

    pub fn render_snapshot(&self) -> Arc<RenderSnapshot> {
        self.snapshot.load_full()
    }

    /// Wakes up after a new render snapshot is published. Wake-ups coalesce.
    pub fn render_updates(&self) -> &Receiver<()> {
        &self.render_updates
    }

    pub fn events(&self) -> &Receiver<ImageEvent> {
        &self.events
    }

    /// Returns once the pipeline thread has applied every call made before
    /// this one, including the latest transformation.
    pub fn flush(&self) {
        let (sender, receiver) = bounded(1);
        self.send(ControlMessage::Flush(sender));
        if receiver.recv().is_err() {
            panic!("viewport pipeline thread exited before answering a flush");
        }
    }

    fn send(&self, message: ControlMessage) {
        if self.control.send(message).is_err() {
            panic!("viewport pipeline control channel disconnected");
        }
    }
}

impl Drop for ViewportPipeline {
    fn drop(&mut self) {
        let _ = self.control.send(ControlMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(target: "pipeline", "viewport pipeline thread panicked");
            }
        }
    }
}

struct OpenImage {
    description: String,
    image_size: IntSize,
    preview: Option<Bitmap>,
    cache: TileCache,
    cache_updates: Receiver<()>,
    displayed_reported: bool,
    full_quality_reported: bool,
}

struct PipelineWorker {
    factory: Arc<dyn RegionDecoderFactory>,
    config: PipelineConfig,
    image: Option<OpenImage>,
    canvas_size: Option<IntSize>,
    grid: Option<TileGrid>,
    transformation: Option<ContentTransformation>,
    last_desired: Vec<Tile>,
    snapshot: Arc<ArcSwap<RenderSnapshot>>,
    render_updates: Sender<()>,
    events: Sender<ImageEvent>,
}

impl PipelineWorker {
    fn run(
        mut self,
        control: Receiver<ControlMessage>,
        transformations: MailboxConsumer<ContentTransformation>,
    ) {
        loop {
            let cache_updates = match &self.image {
                Some(image) => image.cache_updates.clone(),
                None => never(),
            };
            let mut flushes = Vec::new();
            let keep_running = select! {
                recv(control) -> message => match message {
                    Ok(message) => {
                        self.handle(message, &mut flushes)
                            && self.drain(&control, &mut flushes)
                    }
                    Err(_) => false,
                },
                recv(transformations.notifications()) -> _ => true,
                recv(cache_updates) -> _ => true,
            };
            if !keep_running {
                break;
            }
            if let Some(transformation) = transformations.take() {
                self.transformation = Some(transformation);
            }
            self.update();
            for flush in flushes {
                let _ = flush.send(());
            }
        }
        // Dropping the cache cancels its decodes and joins its threads.
        self.image = None;
        debug!(target: "pipeline", "viewport pipeline stopped");
    }

    fn drain(
        &mut self,
        control: &Receiver<ControlMessage>,
        flushes: &mut Vec<Sender<()>>,
    ) -> bool {
        while let Ok(message) = control.try_recv() {
            if !self.handle(message, flushes) {
                return false;
            }
        }
        true
    }

    fn handle(&mut self, message: ControlMessage, flushes: &mut Vec<Sender<()>>) -> bool {
        match message {
            ControlMessage::SetSource(source) => self.open(source),
            ControlMessage::CloseSource => self.close(),
            ControlMessage::SetCanvasSize(canvas_size) => {
                self.canvas_size = (!canvas_size.is_empty()).then_some(canvas_size);
                self.rebuild_grid();
            }
            ControlMessage::Flush(reply) => flushes.push(reply),
            ControlMessage::Shutdown => return false,
        }
        true
    }

    fn open(&mut self, source: ImageSource) {
        // The old cache must be gone before the new decoders are created.
        self.close();
        let description = source.to_string();
        match PooledRegionDecoder::open(self.factory.as_ref(), &source, &self.config.pool) {
            Ok(decoder) => {
                let image_size = decoder.image_size();
                info!(
                    target: "pipeline",
                    source = %description,
                    %image_size,
                    decoders = decoder.pool_size(),
                    "opened image"
                );
                let cache = TileCache::new(Arc::new(decoder), self.config.cache);
                let cache_updates = cache.subscribe();
                self.image = Some(OpenImage {
                    description,
                    image_size,
                    preview: source.preview().cloned(),
                    cache,
                    cache_updates,
                    displayed_reported: false,
                    full_quality_reported: false,
                });
                self.rebuild_grid();
                self.emit(ImageEvent::Opened { image_size });
            }
            Err(error) => {
                warn!(target: "pipeline", source = %description, %error, "failed to open image");
                self.emit(ImageEvent::OpenFailed {
                    error: Arc::new(error),
                });
            }
        }
    }

    fn close(&mut self) {
        if let Some(image) = self.image.take() {
            debug!(target: "pipeline", source = %image.description, "closing image");
        }
        self.grid = None;
        self.last_desired.clear();
    }

    fn rebuild_grid(&mut self) {
        self.grid = match (&self.image, self.canvas_size) {
            (Some(image), Some(canvas_size)) => {
                let grid = TileGrid::generate(canvas_size, image.image_size);
                debug!(
                    target: "pipeline",
                    %canvas_size,
                    levels = ?grid.level_summary(),
                    "generated tile grid"
                );
                Some(grid)
            }
            _ => None,
        };
    }

    fn update(&mut self) {
        let Some(image) = &mut self.image else {
            self.publish(RenderSnapshot::default());
            return;
        };
        let (Some(grid), Some(transformation)) = (&self.grid, &self.transformation) else {
            if !self.last_desired.is_empty() {
                self.last_desired.clear();
                image.cache.load_or_unload_for_tiles(&[]);
            }
            let image_size = Some(image.image_size);
            self.publish(RenderSnapshot {
                image_size,
                ..RenderSnapshot::default()
            });
            return;
        };

        let loaded = image.cache.snapshot();
        let resolved = resolve_tiles(
            grid,
            transformation,
            &loaded.loaded,
            image.preview.as_ref(),
        );
        if resolved.desired != self.last_desired {
            image.cache.load_or_unload_for_tiles(&resolved.desired);
            self.last_desired = resolved.desired;
        }

        let snapshot = RenderSnapshot {
            revision: 0,
            image_size: Some(image.image_size),
            tiles: resolved.renderable,
        };
        let displayed = snapshot.is_displayed() && !image.displayed_reported;
        if displayed {
            image.displayed_reported = true;
            debug!(target: "pipeline", source = %image.description, "image displayed");
        }
        let full_quality = snapshot.is_full_quality() && !image.full_quality_reported;
        if full_quality {
            image.full_quality_reported = true;
            info!(
                target: "pipeline",
                source = %image.description,
                tiles = snapshot.tiles.len(),
                "full quality displayed"
            );
        }
        self.publish(snapshot);
        if displayed {
            self.emit(ImageEvent::Displayed);
        }
        if full_quality {
            self.emit(ImageEvent::FullQualityDisplayed);
        }
    }

    fn publish(&mut self, mut snapshot: RenderSnapshot) {
        let current = self.snapshot.load();
        if current.same_tiles(&snapshot) {
            return;
        }
        snapshot.revision = current.revision + 1;
        self.snapshot.store(Arc::new(snapshot));
        match self.render_updates.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            // Nobody listens once the pipeline handle is gone.
            Err(TrySendError::Disconnected(())) => {}
        }
    }

    fn emit(&self, event: ImageEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::{Duration, Instant};

    use decoder::testing::ScriptedDecoderFactory;
    use image::RgbaImage;
    use model::{IntRect, Offset, ScaleFactor};

    const IMAGE: IntSize = IntSize::new(9_734, 3_265);
    const CANVAS: IntSize = IntSize::new(1080, 2214);
    const TIMEOUT: Duration = Duration::from_secs(10);

    fn config() -> PipelineConfig {
        PipelineConfig {
            pool: PoolConfig {
                min_decoders: 2,
                max_decoders: Some(2),
            },
            cache: TileCacheConfig {
                reconcile_interval_ms: 0,
            },
        }
    }

    fn spawn(factory: &ScriptedDecoderFactory) -> ViewportPipeline {
        ViewportPipeline::spawn(Arc::new(factory.clone()), config())
    }

    fn source(label: &str) -> ImageSource {
        ImageSource::bytes(label, Vec::<u8>::new())
    }

    fn next_event(pipeline: &ViewportPipeline) -> ImageEvent {
        pipeline
            .events()
            .recv_timeout(TIMEOUT)
            .expect("no pipeline event")
    }

    fn wait_for_full_quality(pipeline: &ViewportPipeline) {
        loop {
            if let ImageEvent::FullQualityDisplayed = next_event(pipeline) {
                return;
            }
        }
    }

    fn wait_for_snapshot(
        pipeline: &ViewportPipeline,
        mut ready: impl FnMut(&RenderSnapshot) -> bool,
    ) -> Arc<RenderSnapshot> {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            let snapshot = pipeline.render_snapshot();
            if ready(&snapshot) {
                return snapshot;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            assert!(!remaining.is_zero(), "render snapshot never became ready");
            let _ = pipeline.render_updates().recv_timeout(remaining);
        }
    }

    fn zoomed(scale: f32) -> ContentTransformation {
        ContentTransformation::new(ScaleFactor::uniform(scale), Offset::ZERO, CANVAS)
            .expect("valid transformation")
    }

    #[test]
    fn fitted_image_reaches_full_quality_with_the_base_tile() {
        let factory = ScriptedDecoderFactory::new(IMAGE);
        let pipeline = spawn(&factory);
        pipeline.set_canvas_size(CANVAS);
        pipeline.set_source(source("fixture"));
        assert!(matches!(
            next_event(&pipeline),
            ImageEvent::Opened { image_size } if image_size == IMAGE
        ));

        pipeline.push_transformation(
            ContentTransformation::fit_center(IMAGE, CANVAS).expect("fit"),
        );
        wait_for_full_quality(&pipeline);

        let snapshot = pipeline.render_snapshot();
        assert_eq!(snapshot.image_size, Some(IMAGE));
        assert_eq!(snapshot.tiles.len(), 1);
        assert_eq!(snapshot.tiles[0].tile.bounds, IntRect::from_size(IMAGE));
        assert!(snapshot.is_full_quality());
    }

    #[test]
    fn first_pixels_are_reported_before_full_quality() {
        let factory = ScriptedDecoderFactory::new(IMAGE);
        let pipeline = spawn(&factory);
        pipeline.set_canvas_size(CANVAS);
        pipeline.set_source(source("fixture"));
        pipeline.push_transformation(zoomed(0.3));

        let events: Vec<String> = std::iter::repeat_with(|| next_event(&pipeline))
            .take_while(|event| !matches!(event, ImageEvent::FullQualityDisplayed))
            .map(|event| event.to_string())
            .collect();
        assert_eq!(events, vec!["opened 9734x3265 image", "displayed"]);
        // Each signal goes out once per source.
        pipeline.flush();
        assert!(pipeline.events().try_recv().is_err());
    }

    #[test]
    fn preview_is_displayed_but_not_full_quality() {
        let factory = ScriptedDecoderFactory::new(IMAGE);
        let base = IntRect::from_size(IMAGE);
        factory.block(base);
        let preview = Bitmap::new(RgbaImage::new(1, 1));
        let pipeline = spawn(&factory);
        pipeline.set_canvas_size(CANVAS);
        pipeline.set_source(source("fixture").with_preview(preview.clone()));
        pipeline.push_transformation(
            ContentTransformation::fit_center(IMAGE, CANVAS).expect("fit"),
        );
        factory
            .started()
            .recv_timeout(TIMEOUT)
            .expect("base tile decode did not start");
        pipeline.flush();

        let snapshot = pipeline.render_snapshot();
        assert_eq!(snapshot.tiles.len(), 1);
        assert_eq!(snapshot.tiles[0].bitmap.as_ref(), Some(&preview));
        assert!(!snapshot.is_full_quality());
        assert!(matches!(next_event(&pipeline), ImageEvent::Opened { .. }));
        assert!(matches!(next_event(&pipeline), ImageEvent::Displayed));
        assert!(pipeline.events().try_recv().is_err());

        factory.unblock(base);
        wait_for_full_quality(&pipeline);
        let snapshot = pipeline.render_snapshot();
        assert!(snapshot.tiles[0].is_loaded());
        assert_ne!(snapshot.tiles[0].bitmap.as_ref(), Some(&preview));
    }

    #[test]
    fn open_failure_is_reported_once_and_draws_nothing() {
        let factory = ScriptedDecoderFactory::failing_to_open(IMAGE);
        let pipeline = spawn(&factory);
        pipeline.set_canvas_size(CANVAS);
        pipeline.set_source(source("broken"));
        pipeline.push_transformation(zoomed(1.0));
        pipeline.flush();

        match next_event(&pipeline) {
            ImageEvent::OpenFailed { error } => {
                assert_eq!(error.source_description(), "broken (0 bytes in memory)");
            }
            other => panic!("unexpected event {other}"),
        }
        assert!(pipeline.events().try_recv().is_err());
        assert!(pipeline.render_snapshot().tiles.is_empty());
        assert_eq!(factory.total_decodes(), 0);
    }

    #[test]
    fn base_tile_covers_for_a_missing_fine_tile() {
        let factory = ScriptedDecoderFactory::new(IMAGE);
        let pipeline = spawn(&factory);
        pipeline.set_canvas_size(CANVAS);
        pipeline.set_source(source("fixture"));

        let transformation = zoomed(0.3);
        let grid = TileGrid::generate(CANVAS, IMAGE);
        let resolved = resolve_tiles(&grid, &transformation, &Default::default(), None);
        let visible = resolved.desired[1..].to_vec();
        let stuck = visible[0];
        factory.block(stuck.bounds);

        pipeline.push_transformation(transformation);
        let snapshot = wait_for_snapshot(&pipeline, |snapshot| {
            snapshot.loaded_tiles() == visible.len()
        });
        // Base tile plus every visible tile, the stuck one still a placeholder.
        assert_eq!(snapshot.tiles.len(), visible.len() + 1);
        assert_eq!(snapshot.tiles[0].tile, grid.base());
        assert!(snapshot.tiles[0].is_loaded());
        assert!(
            snapshot
                .tiles
                .iter()
                .any(|canvas_tile| canvas_tile.tile == stuck && !canvas_tile.is_loaded())
        );

        factory.unblock(stuck.bounds);
        wait_for_full_quality(&pipeline);
        let snapshot = pipeline.render_snapshot();
        assert_eq!(snapshot.tiles.len(), visible.len());
        assert!(snapshot.tiles.iter().all(|canvas_tile| canvas_tile.tile != grid.base()));
    }

    #[test]
    fn switching_source_cancels_the_previous_image() {
        let factory = ScriptedDecoderFactory::new(IMAGE);
        factory.block(IntRect::from_size(IMAGE));
        let pipeline = spawn(&factory);
        pipeline.set_canvas_size(CANVAS);
        pipeline.set_source(source("first"));
        pipeline.push_transformation(
            ContentTransformation::fit_center(IMAGE, CANVAS).expect("fit"),
        );
        factory
            .started()
            .recv_timeout(TIMEOUT)
            .expect("base tile decode did not start");

        pipeline.set_source(source("second"));
        factory
            .started()
            .recv_timeout(TIMEOUT)
            .expect("second base tile decode did not start");
        // The first cache was dropped and joined before the second one opened.
        assert_eq!(factory.active(), 1);
        factory.unblock_all();
        wait_for_full_quality(&pipeline);
        assert_eq!(factory.decode_count(IntRect::from_size(IMAGE)), 2);
    }

    #[test]
    fn closing_the_source_clears_the_draw_list() {
        let factory = ScriptedDecoderFactory::new(IMAGE);
        let pipeline = spawn(&factory);
        pipeline.set_canvas_size(CANVAS);
        pipeline.set_source(source("fixture"));
        pipeline.push_transformation(zoomed(0.3));
        wait_for_full_quality(&pipeline);

        pipeline.close_source();
        pipeline.flush();
        let snapshot = pipeline.render_snapshot();
        assert_eq!(snapshot.image_size, None);
        assert!(snapshot.tiles.is_empty());
    }

    #[test]
    fn empty_canvas_hides_every_tile() {
        let factory = ScriptedDecoderFactory::new(IMAGE);
        let pipeline = spawn(&factory);
        pipeline.set_canvas_size(CANVAS);
        pipeline.set_source(source("fixture"));
        pipeline.push_transformation(zoomed(0.3));
        wait_for_full_quality(&pipeline);

        pipeline.set_canvas_size(IntSize::ZERO);
        pipeline.flush();
        let snapshot = pipeline.render_snapshot();
        assert_eq!(snapshot.image_size, Some(IMAGE));
        assert!(snapshot.tiles.is_empty());
    }

    #[test]
    fn config_fills_missing_fields_with_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "cache": { "reconcile_interval_ms": 0 } }"#)
                .expect("parse pipeline config");
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.cache.reconcile_interval_ms, 0);
    }
}
