use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use crossbeam_queue::ArrayQueue;

// Single producer, single consumer. Neither half is Clone and the Arc is never
// exposed, so no extra producers or consumers can be created.
struct SharedMailbox<T> {
    // One slot: a push over an unconsumed value replaces it.
    slot: ArrayQueue<T>,
    notify_sender: Sender<()>,
    notify_receiver: Receiver<()>,
}

/// Latest-value mailbox. Pushing never blocks and the consumer only ever sees
/// the newest value.
pub fn latest_mailbox<T>() -> (MailboxProducer<T>, MailboxConsumer<T>) {
    let (notify_sender, notify_receiver) = bounded(1);
    let shared = Arc::new(SharedMailbox {
        slot: ArrayQueue::new(1),
        notify_sender,
        notify_receiver,
    });
    (
        MailboxProducer {
            shared: shared.clone(),
        },
        MailboxConsumer { shared },
    )
}

pub struct MailboxProducer<T> {
    shared: Arc<SharedMailbox<T>>,
}

impl<T> MailboxProducer<T> {
    pub fn push(&self, value: T) {
        let mut pending = value;
        loop {
            match self.shared.slot.push(pending) {
                Ok(()) => {
                    match self.shared.notify_sender.try_send(()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(())) => {}
                        Err(TrySendError::Disconnected(())) => {
                            panic!("mailbox notify channel disconnected")
                        }
                    }
                    return;
                }
                Err(returned) => {
                    pending = returned;
                    if self.shared.slot.pop().is_none() {
                        std::thread::yield_now();
                    }
                }
            }
        }
    }
}

pub struct MailboxConsumer<T> {
    shared: Arc<SharedMailbox<T>>,
}

impl<T> MailboxConsumer<T> {
    pub fn take(&self) -> Option<T> {
        self.shared.slot.pop()
    }

    /// Receives at least one wake-up after every push. Wake-ups coalesce, so
    /// a wake-up can find the mailbox already empty.
    pub fn notifications(&self) -> &Receiver<()> {
        &self.shared.notify_receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn consumer_sees_only_the_latest_value() {
        let (producer, consumer) = latest_mailbox();
        for value in 0..5 {
            producer.push(value);
        }
        assert_eq!(consumer.take(), Some(4));
        assert_eq!(consumer.take(), None);
    }

    #[test]
    fn pushes_coalesce_into_one_wakeup() {
        let (producer, consumer) = latest_mailbox();
        producer.push("first");
        producer.push("second");
        assert!(consumer.notifications().try_recv().is_ok());
        assert!(consumer.notifications().try_recv().is_err());
        assert_eq!(consumer.take(), Some("second"));
    }

    #[test]
    fn push_from_another_thread_wakes_the_consumer() {
        let (producer, consumer) = latest_mailbox();
        let pusher = std::thread::spawn(move || producer.push(42_u32));
        consumer
            .notifications()
            .recv_timeout(Duration::from_secs(5))
            .expect("no wake-up");
        assert_eq!(consumer.take(), Some(42));
        pusher.join().expect("pusher panicked");
    }
}
