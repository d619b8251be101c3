//! Reconciliation of tracked tiles against the set the viewport needs.
//!
//! Pure bookkeeping: no threads, no decoding. The cache actor owns one
//! instance and is the only writer.

use std::collections::{HashMap, HashSet};

use decoder::{Bitmap, CancelHandle, CancelToken, DecodeError, cancel_pair};
use model::Tile;

/// Identifies one launched decode. A completion whose ticket no longer
/// matches the tracked entry belongs to work that was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecodeTicket(u64);

#[derive(Debug)]
enum TileEntry {
    InFlight {
        ticket: DecodeTicket,
        _cancel: CancelHandle,
    },
    Loaded(Bitmap),
    // Observably absent; kept so the tile isn't decoded again while it stays desired.
    Failed,
}

#[derive(Debug, Clone)]
pub struct DecodeJob {
    pub tile: Tile,
    pub ticket: DecodeTicket,
    pub cancel: CancelToken,
}

#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// New decodes, in the order the tiles were desired.
    pub launches: Vec<DecodeJob>,
    pub cancelled: usize,
    pub evicted: usize,
    pub forgotten_failures: usize,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.launches.is_empty()
            && self.cancelled == 0
            && self.evicted == 0
            && self.forgotten_failures == 0
    }
}

#[derive(Debug)]
pub enum CompletionOutcome {
    Loaded,
    Failed(DecodeError),
    /// The decoder gave up on its own; the tile is absent and will be
    /// requested again by the next reconciliation that desires it.
    Abandoned,
    /// Cancelled or superseded work. Nothing changed.
    Stale,
}

#[derive(Debug, Default)]
pub struct TileCacheState {
    entries: HashMap<Tile, TileEntry>,
    next_ticket: u64,
    /// Bumped whenever the set of loaded bitmaps changes.
    revision: u64,
}

impl TileCacheState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn reconcile(&mut self, desired: &[Tile]) -> ReconcilePlan {
        let desired_set: HashSet<Tile> = desired.iter().copied().collect();
        let mut plan = ReconcilePlan::default();

        self.entries.retain(|tile, entry| {
            if desired_set.contains(tile) {
                return true;
            }
            match entry {
                // Dropping the handle cancels the token the decode is watching.
                TileEntry::InFlight { .. } => plan.cancelled += 1,
                TileEntry::Loaded(_) => plan.evicted += 1,
                TileEntry::Failed => plan.forgotten_failures += 1,
            }
            false
        });

        for &tile in desired {
            if self.entries.contains_key(&tile) {
                continue;
            }
            let ticket = self.issue_ticket();
            let (handle, token) = cancel_pair();
            self.entries.insert(
                tile,
                TileEntry::InFlight {
                    ticket,
                    _cancel: handle,
                },
            );
            plan.launches.push(DecodeJob {
                tile,
                ticket,
                cancel: token,
            });
        }

        if plan.evicted > 0 {
            self.revision += 1;
        }
        plan
    }

    pub fn complete(
        &mut self,
        tile: Tile,
        ticket: DecodeTicket,
        result: Result<Bitmap, DecodeError>,
    ) -> CompletionOutcome {
        let Some(entry) = self.entries.get_mut(&tile) else {
            return CompletionOutcome::Stale;
        };
        match entry {
            TileEntry::InFlight {
                ticket: current, ..
            } if *current == ticket => {}
            _ => return CompletionOutcome::Stale,
        }

        match result {
            Ok(bitmap) => {
                *entry = TileEntry::Loaded(bitmap);
                self.revision += 1;
                CompletionOutcome::Loaded
            }
            Err(DecodeError::Cancelled) => {
                self.entries.remove(&tile);
                CompletionOutcome::Abandoned
            }
            Err(error) => {
                *entry = TileEntry::Failed;
                CompletionOutcome::Failed(error)
            }
        }
    }

    /// Cancels in-flight work and drops every bitmap.
    pub fn reset(&mut self) -> ReconcilePlan {
        self.reconcile(&[])
    }

    pub fn bitmap(&self, tile: &Tile) -> Option<&Bitmap> {
        match self.entries.get(tile) {
            Some(TileEntry::Loaded(bitmap)) => Some(bitmap),
            _ => None,
        }
    }

    pub fn loaded(&self) -> HashMap<Tile, Bitmap> {
        self.entries
            .iter()
            .filter_map(|(tile, entry)| match entry {
                TileEntry::Loaded(bitmap) => Some((*tile, bitmap.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn tracked(&self) -> usize {
        self.entries.len()
    }

    pub fn in_flight(&self) -> usize {
        self.count(|entry| matches!(entry, TileEntry::InFlight { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|entry| matches!(entry, TileEntry::Failed))
    }

    pub fn is_in_flight(&self, tile: &Tile) -> bool {
        matches!(self.entries.get(tile), Some(TileEntry::InFlight { .. }))
    }

    fn count(&self, predicate: impl Fn(&TileEntry) -> bool) -> usize {
        self.entries.values().filter(|entry| predicate(entry)).count()
    }

    fn issue_ticket(&mut self) -> DecodeTicket {
        let ticket = DecodeTicket(self.next_ticket);
        self.next_ticket = self
            .next_ticket
            .checked_add(1)
            .expect("decode ticket overflow");
        ticket
    }
}
