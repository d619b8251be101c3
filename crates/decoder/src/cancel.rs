use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, never};

/// Owning side of a cancellation pair. Dropping it cancels the token.
#[derive(Debug)]
pub struct CancelHandle {
    _sender: Sender<()>,
}

/// Observed by decode work. Cancelled once its handle is gone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: Receiver<()>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = bounded(0);
    (CancelHandle { _sender: sender }, CancelToken { receiver })
}

impl CancelHandle {
    pub fn cancel(self) {}
}

impl CancelToken {
    /// A token nobody can cancel.
    pub fn never() -> Self {
        Self { receiver: never() }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Becomes ready, with an error, when the token is cancelled. Meant for
    /// `crossbeam_channel::select!` next to the channel being waited on.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}
