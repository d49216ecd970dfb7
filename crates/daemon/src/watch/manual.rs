//! Manual trigger source (`SIGUSR1`)

use super::{Shutdown, SourceHandle, stopped};
use common::{SignalReceiver, signal_slot};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info};

const SOURCE: &str = "manual";

/// Forward `SIGUSR1` to the dispatcher until shutdown
pub fn spawn(mut shutdown: Shutdown) -> (SignalReceiver, SourceHandle) {
    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("manual: failed to install SIGUSR1 handler: {}", e);
            return (SignalReceiver::never(), SourceHandle::idle(SOURCE));
        }
    };

    let (events, receiver) = signal_slot();
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                received = usr1.recv() => match received {
                    Some(()) => {
                        info!("manual: SIGUSR1 received, requesting health check");
                        if !events.raise() {
                            debug!("manual: request absorbed by pending signal");
                        }
                    }
                    None => break,
                },
            }
        }
    });

    (receiver, SourceHandle::idle(SOURCE).with_task(task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{DEFAULT_TEST_TIMEOUT, with_timeout};
    use nix::sys::signal::{Signal, raise};

    #[tokio::test]
    async fn test_sigusr1_raises_signal_and_stops() {
        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        let (receiver, handle) = spawn(stop_rx);

        raise(Signal::SIGUSR1).unwrap();
        with_timeout(DEFAULT_TEST_TIMEOUT, receiver.recv())
            .await
            .unwrap()
            .unwrap();

        stop_tx.send(true).unwrap();
        with_timeout(DEFAULT_TEST_TIMEOUT, handle.join())
            .await
            .unwrap();

        // Sender is gone once the task has exited
        assert!(receiver.recv().await.is_err());
    }
}
