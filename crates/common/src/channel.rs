//! Single-slot signal channel between event sources and the dispatcher
//!
//! Event sources run on their own threads (often inside a native callback)
//! and must never block. A signal carries no payload, so a slot that already
//! holds a pending signal absorbs any further ones: a burst of arrivals
//! collapses into one wake-up for the receiver.

use async_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

/// Sending half, owned by an event source
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: Sender<()>,
}

impl SignalSender {
    /// Raise the signal without blocking
    ///
    /// Returns `true` if the slot was empty and the signal is now pending,
    /// `false` if it was absorbed by an already-pending signal or the
    /// receiver is gone.
    pub fn raise(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => false,
            Err(TrySendError::Closed(())) => false,
        }
    }

    /// Whether the receiving side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, owned by the dispatcher
#[derive(Debug, Clone)]
pub struct SignalReceiver {
    rx: Receiver<()>,
}

impl SignalReceiver {
    /// Wait for the next signal
    ///
    /// Fails once every sender has been dropped and no signal is pending,
    /// i.e. the source has stopped for good.
    pub async fn recv(&self) -> crate::Result<()> {
        self.rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Take a pending signal without waiting
    pub fn try_recv(&self) -> Option<()> {
        match self.rx.try_recv() {
            Ok(()) => Some(()),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Whether a signal is waiting in the slot
    pub fn is_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    /// A receiver whose source never emits
    ///
    /// Used when a source is disabled or could not be registered; the
    /// dispatcher keeps running on its remaining sources.
    pub fn never() -> Self {
        let (_tx, rx) = bounded(1);
        Self { rx }
    }
}

/// Create a single-slot signal channel
///
/// Returns (SignalSender for the event source, SignalReceiver for the dispatcher)
pub fn signal_slot() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = bounded(1);
    (SignalSender { tx }, SignalReceiver { rx })
}
