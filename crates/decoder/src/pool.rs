use std::num::NonZeroUsize;
use std::ops::{Deref, DerefMut};

use crossbeam_channel::{Receiver, Sender, bounded, select};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::DecodeError;

/// Sizing of a decoder pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_decoders: usize,
    pub max_decoders: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_decoders: 2,
            max_decoders: None,
        }
    }
}

impl PoolConfig {
    /// Available parallelism clamped to the configured bounds.
    pub fn decoder_count(&self) -> usize {
        let parallelism = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        self.decoder_count_for(parallelism)
    }

    fn decoder_count_for(&self, parallelism: usize) -> usize {
        let floor = self.min_decoders;
        if floor == 0 {
            panic!("invalid pool config: min_decoders must be at least 1");
        }
        let count = parallelism.max(floor);
        match self.max_decoders {
            Some(ceiling) if ceiling < floor => panic!(
                "invalid pool config: min_decoders ({floor}) exceeds max_decoders ({ceiling})"
            ),
            Some(ceiling) => count.min(ceiling),
            None => count,
        }
    }
}

/// Fixed set of resources lent out one borrower at a time.
pub struct ResourcePool<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    size: usize,
}

impl<T> ResourcePool<T> {
    pub fn new(resources: Vec<T>) -> Self {
        assert!(
            !resources.is_empty(),
            "resource pool needs at least one resource"
        );
        let size = resources.len();
        let (sender, receiver) = bounded(size);
        for resource in resources {
            if sender.try_send(resource).is_err() {
                panic!("resource pool channel rejected an initial resource");
            }
        }
        Self {
            sender,
            receiver,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Resources not currently lent out.
    pub fn available(&self) -> usize {
        self.receiver.len()
    }

    /// Blocks until a resource is free or `cancel` fires.
    pub fn borrow(&self, cancel: &CancelToken) -> Result<Lease<'_, T>, DecodeError> {
        if cancel.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }
        select! {
            recv(self.receiver) -> resource => match resource {
                Ok(resource) => Ok(Lease {
                    pool: self,
                    resource: Some(resource),
                }),
                Err(_) => panic!("resource pool channel disconnected while the pool is alive"),
            },
            recv(cancel.receiver()) -> _ => Err(DecodeError::Cancelled),
        }
    }

    fn give_back(&self, resource: T) {
        if self.sender.try_send(resource).is_err() {
            panic!("resource pool received more resources than it lent out");
        }
    }
}

/// A borrowed resource. Returned to its pool when dropped, unwinding included.
pub struct Lease<'pool, T> {
    pool: &'pool ResourcePool<T>,
    resource: Option<T>,
}

impl<T> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("lease resource is only taken on drop"),
        }
    }
}

impl<T> DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.resource {
            Some(resource) => resource,
            None => unreachable!("lease resource is only taken on drop"),
        }
    }
}

impl<T> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.give_back(resource);
        }
    }
}
