//! Broadcast channel for committed events.
//!
//! The store is the record; the bus only fans committed envelopes out to
//! in-process consumers such as the activity log. A consumer that misses a
//! message can always reread the store.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Outcome of waiting on a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received<M> {
    Message(M),
    /// Nothing arrived before the timeout.
    Idle,
    /// The bus was dropped; no further messages will come.
    Closed,
}

/// One consumer's view of a bus: every message published after subscribing,
/// in publish order.
#[derive(Debug)]
pub struct Subscription<M> {
    inbox: Receiver<M>,
}

impl<M> From<Receiver<M>> for Subscription<M> {
    fn from(inbox: Receiver<M>) -> Self {
        Self { inbox }
    }
}

impl<M> Subscription<M> {
    /// Next queued message, without waiting.
    pub fn try_next(&self) -> Option<M> {
        match self.inbox.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next message.
    pub fn wait(&self, timeout: Duration) -> Received<M> {
        match self.inbox.recv_timeout(timeout) {
            Ok(message) => Received::Message(message),
            Err(RecvTimeoutError::Timeout) => Received::Idle,
            Err(RecvTimeoutError::Disconnected) => Received::Closed,
        }
    }
}

/// Publish/subscribe seam the dispatcher publishes through.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn wait_reports_idle_then_closed() {
        let (tx, rx) = mpsc::channel::<u8>();
        let sub = Subscription::from(rx);

        assert_eq!(sub.wait(Duration::from_millis(5)), Received::Idle);
        tx.send(7).unwrap();
        assert_eq!(sub.wait(Duration::from_millis(5)), Received::Message(7));
        drop(tx);
        assert_eq!(sub.wait(Duration::from_millis(5)), Received::Closed);
        assert_eq!(sub.try_next(), None);
    }
}
