//! Scriptable in-memory decoder for exercising the cache and pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use image::{Rgba, RgbaImage};
use model::{IntRect, IntSize};

use crate::bitmap::Bitmap;
use crate::error::{DecodeError, OpenError};
use crate::region::{DecodeRequest, RegionDecoder, RegionDecoderFactory};
use crate::source::ImageSource;

const BLOCKED_POLL_INTERVAL: Duration = Duration::from_millis(2);

#[derive(Default)]
struct Script {
    blocked: HashSet<IntRect>,
    failing: HashSet<IntRect>,
    started: HashMap<IntRect, usize>,
    active: usize,
}

/// Regions can be blocked (the decode waits until unblocked or cancelled)
/// or made to fail. Every decoder the factory creates shares one script.
#[derive(Clone)]
pub struct ScriptedDecoderFactory {
    image_size: IntSize,
    fail_open: bool,
    script: Arc<Mutex<Script>>,
    started_sender: Sender<IntRect>,
    started_receiver: Receiver<IntRect>,
}

impl ScriptedDecoderFactory {
    pub fn new(image_size: IntSize) -> Self {
        let (started_sender, started_receiver) = unbounded();
        Self {
            image_size,
            fail_open: false,
            script: Arc::default(),
            started_sender,
            started_receiver,
        }
    }

    pub fn failing_to_open(image_size: IntSize) -> Self {
        Self {
            fail_open: true,
            ..Self::new(image_size)
        }
    }

    pub fn block(&self, region: IntRect) {
        self.script().blocked.insert(region);
    }

    pub fn unblock(&self, region: IntRect) {
        self.script().blocked.remove(&region);
    }

    pub fn unblock_all(&self) {
        self.script().blocked.clear();
    }

    pub fn fail(&self, region: IntRect) {
        self.script().failing.insert(region);
    }

    /// Decodes started for `region`, cancelled ones included.
    pub fn decode_count(&self, region: IntRect) -> usize {
        self.script().started.get(&region).copied().unwrap_or(0)
    }

    pub fn total_decodes(&self) -> usize {
        self.script().started.values().sum()
    }

    /// Decodes currently running.
    pub fn active(&self) -> usize {
        self.script().active
    }

    /// Regions in the order their decodes started.
    pub fn started(&self) -> &Receiver<IntRect> {
        &self.started_receiver
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RegionDecoderFactory for ScriptedDecoderFactory {
    fn create(&self, source: &ImageSource) -> Result<Box<dyn RegionDecoder>, OpenError> {
        if self.fail_open {
            return Err(OpenError::unsupported(
                source.to_string(),
                "scripted open failure",
            ));
        }
        Ok(Box::new(ScriptedDecoder {
            factory: self.clone(),
        }))
    }
}

struct ScriptedDecoder {
    factory: ScriptedDecoderFactory,
}

impl ScriptedDecoder {
    fn run(&self, request: &DecodeRequest<'_>) -> Result<Bitmap, DecodeError> {
        let region = request.region;
        let _ = self.factory.started_sender.send(region);
        while self.factory.script().blocked.contains(&region) {
            select! {
                recv(request.cancel.receiver()) -> _ => return Err(DecodeError::Cancelled),
                default(BLOCKED_POLL_INTERVAL) => {}
            }
        }
        if request.cancel.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }
        if self.factory.script().failing.contains(&region) {
            return Err(DecodeError::Io(std::io::Error::other("scripted decode failure")));
        }
        let size = request.output_size();
        let shade = (request.sample_size.get().min(255)) as u8;
        Ok(Bitmap::new(RgbaImage::from_pixel(
            size.width,
            size.height,
            Rgba([shade, shade, shade, 255]),
        )))
    }
}

impl RegionDecoder for ScriptedDecoder {
    fn image_size(&self) -> IntSize {
        self.factory.image_size
    }

    fn decode_region(&mut self, request: &DecodeRequest<'_>) -> Result<Bitmap, DecodeError> {
        {
            let mut script = self.factory.script();
            *script.started.entry(request.region).or_default() += 1;
            script.active += 1;
        }
        let result = self.run(request);
        self.factory.script().active -= 1;
        result
    }
}
