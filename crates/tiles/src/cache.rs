use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, TrySendError, at, bounded, never, select, unbounded};
use decoder::{Bitmap, DecodeError, PooledRegionDecoder};
use model::Tile;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::lifecycle::{CompletionOutcome, DecodeJob, DecodeTicket, TileCacheState};
use crate::throttle::{LatestThrottle, ThrottleDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileCacheConfig {
    /// Minimum time between two reconciliations. `0` applies every desired
    /// set as soon as it arrives.
    pub reconcile_interval_ms: u64,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: 100,
        }
    }
}

impl TileCacheConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }
}

/// Loaded bitmaps plus bookkeeping counters, published after every change.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    /// Changes whenever `loaded` changes.
    pub revision: u64,
    pub loaded: HashMap<Tile, Bitmap>,
    pub tracked: usize,
    pub in_flight: usize,
    pub failed: usize,
}

impl CacheSnapshot {
    pub fn bitmap(&self, tile: &Tile) -> Option<&Bitmap> {
        self.loaded.get(tile)
    }

    pub fn is_settled(&self) -> bool {
        self.in_flight == 0
    }
}

enum CacheMessage {
    Desired(Vec<Tile>),
    Decoded {
        tile: Tile,
        ticket: DecodeTicket,
        result: Result<Bitmap, DecodeError>,
    },
    Subscribe(Sender<()>),
    Flush(Sender<()>),
    Settle(Sender<()>),
    Shutdown,
}

/// Keeps bitmaps for exactly the tiles the viewport needs.
///
/// One actor thread owns the cache state; decode workers send their results
/// back through the same inbox, so every transition is serialized. Dropping
/// the cache cancels outstanding decodes and joins every thread.
pub struct TileCache {
    inbox: Sender<CacheMessage>,
    snapshot: Arc<ArcSwap<CacheSnapshot>>,
    actor: Option<JoinHandle<()>>,
}

impl TileCache {
    pub fn new(decoder: Arc<PooledRegionDecoder>, config: TileCacheConfig) -> Self {
        let (inbox, inbox_receiver) = unbounded();
        let (job_sender, job_receiver) = unbounded::<DecodeJob>();
        let snapshot = Arc::new(ArcSwap::from_pointee(CacheSnapshot::default()));

        let worker_count = decoder.pool_size();
        let workers = (0..worker_count)
            .map(|index| {
                let decoder = decoder.clone();
                let jobs = job_receiver.clone();
                let completions = inbox.clone();
                std::thread::Builder::new()
                    .name(format!("tile-decode-{index}"))
                    .spawn(move || decode_worker(decoder, jobs, completions))
                    .unwrap_or_else(|error| panic!("failed to spawn tile decode worker: {error}"))
            })
            .collect();

        let actor = CacheActor {
            state: TileCacheState::new(),
            throttle: LatestThrottle::new(config.reconcile_interval()),
            last_desired: None,
            jobs: Some(job_sender),
            workers,
            subscribers: Vec::new(),
            settle_waiters: Vec::new(),
            snapshot: snapshot.clone(),
            published_revision: 0,
        };
        let actor = std::thread::Builder::new()
            .name("tile-cache".to_string())
            .spawn(move || actor.run(inbox_receiver))
            .unwrap_or_else(|error| panic!("failed to spawn tile cache actor: {error}"));

        Self {
            inbox,
            snapshot,
            actor: Some(actor),
        }
    }

    /// Starts decodes for desired tiles that are missing and releases tiles
    /// that are no longer desired. Never blocks.
    pub fn load_or_unload_for_tiles(&self, desired: &[Tile]) {
        self.send(CacheMessage::Desired(desired.to_vec()));
    }

    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.snapshot.load_full()
    }

    /// Receives a wake-up whenever the loaded set changes. Wake-ups coalesce.
    pub fn subscribe(&self) -> Receiver<()> {
        let (sender, receiver) = bounded(1);
        self.send(CacheMessage::Subscribe(sender));
        receiver
    }

    /// Returns once every message sent before it has been applied.
    pub fn flush(&self) {
        let (sender, receiver) = bounded(1);
        self.send(CacheMessage::Flush(sender));
        if receiver.recv().is_err() {
            panic!("tile cache actor exited before answering a flush");
        }
    }

    /// Waits until no reconciliation is pending and no decode is in flight.
    pub fn settle(&self) {
        let (sender, receiver) = bounded(1);
        self.send(CacheMessage::Settle(sender));
        if receiver.recv().is_err() {
            panic!("tile cache actor exited before settling");
        }
    }

    pub fn settle_timeout(&self, timeout: Duration) -> bool {
        let (sender, receiver) = bounded(1);
        self.send(CacheMessage::Settle(sender));
        receiver.recv_timeout(timeout).is_ok()
    }

    fn send(&self, message: CacheMessage) {
        if self.inbox.send(message).is_err() {
            panic!("tile cache actor inbox disconnected");
        }
    }
}

impl Drop for TileCache {
    fn drop(&mut self) {
        let _ = self.inbox.send(CacheMessage::Shutdown);
        if let Some(actor) = self.actor.take() {
            if actor.join().is_err() {
                warn!(target: "tiles", "tile cache actor panicked");
            }
        }
    }
}

struct CacheActor {
    state: TileCacheState,
    throttle: LatestThrottle<Vec<Tile>>,
    last_desired: Option<Vec<Tile>>,
    jobs: Option<Sender<DecodeJob>>,
    workers: Vec<JoinHandle<()>>,
    subscribers: Vec<Sender<()>>,
    settle_waiters: Vec<Sender<()>>,
    snapshot: Arc<ArcSwap<CacheSnapshot>>,
    published_revision: u64,
}

impl CacheActor {
    fn run(mut self, inbox: Receiver<CacheMessage>) {
        loop {
            let timer = match self.throttle.deadline() {
                Some(deadline) => at(deadline),
                None => never(),
            };
            let keep_running = select! {
                recv(inbox) -> message => match message {
                    Ok(message) => self.handle(message) && self.drain(&inbox),
                    Err(_) => false,
                },
                recv(timer) -> _ => {
                    if let Some(desired) = self.throttle.take_due(Instant::now()) {
                        self.apply(desired);
                    }
                    true
                },
            };
            if !keep_running {
                break;
            }
            self.publish();
            self.answer_settle_waiters();
        }
        self.shutdown();
    }

    fn drain(&mut self, inbox: &Receiver<CacheMessage>) -> bool {
        while let Ok(message) = inbox.try_recv() {
            if !self.handle(message) {
                return false;
            }
        }
        true
    }

    fn handle(&mut self, message: CacheMessage) -> bool {
        match message {
            CacheMessage::Desired(desired) => {
                if self.last_desired.as_ref() == Some(&desired) {
                    return true;
                }
                self.last_desired = Some(desired.clone());
                match self.throttle.offer(desired, Instant::now()) {
                    ThrottleDecision::ApplyNow(desired) => self.apply(desired),
                    ThrottleDecision::Deferred { .. } => {}
                }
            }
            CacheMessage::Decoded {
                tile,
                ticket,
                result,
            } => match self.state.complete(tile, ticket, result) {
                CompletionOutcome::Loaded => trace!(target: "tiles", %tile, "tile loaded"),
                CompletionOutcome::Failed(error) => {
                    warn!(target: "tiles", %tile, %error, "tile decode failed")
                }
                CompletionOutcome::Abandoned => {
                    debug!(target: "tiles", %tile, "decoder abandoned tile")
                }
                CompletionOutcome::Stale => {}
            },
            CacheMessage::Subscribe(subscriber) => self.subscribers.push(subscriber),
            CacheMessage::Flush(reply) => {
                // Everything queued before the flush has been handled.
                self.publish();
                let _ = reply.send(());
            }
            CacheMessage::Settle(reply) => self.settle_waiters.push(reply),
            CacheMessage::Shutdown => return false,
        }
        true
    }

    fn apply(&mut self, desired: Vec<Tile>) {
        let plan = self.state.reconcile(&desired);
        if plan.is_noop() {
            return;
        }
        debug!(
            target: "tiles",
            desired = desired.len(),
            launched = plan.launches.len(),
            cancelled = plan.cancelled,
            evicted = plan.evicted,
            "reconciled tile cache"
        );
        let Some(jobs) = &self.jobs else {
            return;
        };
        for job in plan.launches {
            if jobs.send(job).is_err() {
                panic!("tile decode workers exited while the cache is alive");
            }
        }
    }

    fn publish(&mut self) {
        let snapshot = CacheSnapshot {
            revision: self.state.revision(),
            loaded: self.state.loaded(),
            tracked: self.state.tracked(),
            in_flight: self.state.in_flight(),
            failed: self.state.failed(),
        };
        let loaded_changed = snapshot.revision != self.published_revision;
        self.snapshot.store(Arc::new(snapshot));
        if loaded_changed {
            self.published_revision = self.state.revision();
            self.notify_subscribers();
        }
    }

    fn notify_subscribers(&mut self) {
        self.subscribers
            .retain(|subscriber| match subscriber.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => true,
                Err(TrySendError::Disconnected(())) => false,
            });
    }

    fn answer_settle_waiters(&mut self) {
        if self.settle_waiters.is_empty()
            || self.throttle.has_pending()
            || self.state.in_flight() > 0
        {
            return;
        }
        for waiter in self.settle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn shutdown(mut self) {
        let plan = self.state.reset();
        debug!(
            target: "tiles",
            cancelled = plan.cancelled,
            evicted = plan.evicted,
            "shutting down tile cache"
        );
        // Workers exit once the job queue is closed and drained.
        self.jobs = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!(target: "tiles", "tile decode worker panicked");
            }
        }
        self.publish();
    }
}

fn decode_worker(
    decoder: Arc<PooledRegionDecoder>,
    jobs: Receiver<DecodeJob>,
    completions: Sender<CacheMessage>,
) {
    for job in jobs.iter() {
        if job.cancel.is_cancelled() {
            continue;
        }
        let tile = job.tile;
        let result = decoder.decode(tile.bounds, tile.sample_size, &job.cancel);
        if matches!(result, Err(DecodeError::Cancelled)) && job.cancel.is_cancelled() {
            continue;
        }
        let message = CacheMessage::Decoded {
            tile,
            ticket: job.ticket,
            result,
        };
        if completions.send(message).is_err() {
            break;
        }
    }
}
