use std::time::{Duration, Instant};

/// Applies at most one value per interval, always the latest one offered.
///
/// The first offer after a quiet period goes through immediately; offers
/// inside the interval replace each other and the survivor is released once
/// the interval has passed.
#[derive(Debug)]
pub struct LatestThrottle<T> {
    interval: Duration,
    last_applied: Option<Instant>,
    pending: Option<T>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ThrottleDecision<T> {
    ApplyNow(T),
    Deferred { until: Instant },
}

impl<T> LatestThrottle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_applied: None,
            pending: None,
        }
    }

    pub fn offer(&mut self, value: T, now: Instant) -> ThrottleDecision<T> {
        match self.next_slot() {
            Some(until) if until > now => {
                self.pending = Some(value);
                ThrottleDecision::Deferred { until }
            }
            _ => {
                self.pending = None;
                self.last_applied = Some(now);
                ThrottleDecision::ApplyNow(value)
            }
        }
    }

    /// When the pending value becomes due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref()?;
        Some(self.next_slot().unwrap_or_else(Instant::now))
    }

    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        let deadline = self.deadline()?;
        if deadline > now {
            return None;
        }
        self.last_applied = Some(now);
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn next_slot(&self) -> Option<Instant> {
        if self.interval.is_zero() {
            return None;
        }
        self.last_applied.map(|last| last + self.interval)
    }
}
