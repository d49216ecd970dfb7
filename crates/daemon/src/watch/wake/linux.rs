//! Wake detection through logind
//!
//! logind broadcasts `PrepareForSleep(true)` on the system bus before
//! suspending and `PrepareForSleep(false)` once the system is running
//! again. Only the second one raises a signal.

use crate::watch::{Shutdown, SourceHandle, stopped};
use common::{SignalReceiver, SignalSender, signal_slot};
use futures_util::StreamExt;
use tracing::{debug, error, info, warn};
use zbus::message::Message;
use zbus::{Connection, Proxy};

const SOURCE: &str = "wake";

const LOGIND_DESTINATION: &str = "org.freedesktop.login1";
const LOGIND_PATH: &str = "/org/freedesktop/login1";
const LOGIND_MANAGER: &str = "org.freedesktop.login1.Manager";
const PREPARE_FOR_SLEEP: &str = "PrepareForSleep";

/// Direction of a logind sleep transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepTransition {
    Suspending,
    Resumed,
}

impl SleepTransition {
    /// Decode the boolean argument of a `PrepareForSleep` signal
    pub fn from_message(message: &Message) -> zbus::Result<Self> {
        let start: bool = message.body().deserialize()?;
        Ok(if start {
            SleepTransition::Suspending
        } else {
            SleepTransition::Resumed
        })
    }
}

/// Start following logind sleep transitions
pub fn spawn(mut shutdown: Shutdown) -> (SignalReceiver, SourceHandle) {
    let (events, receiver) = signal_slot();

    let task = tokio::spawn(async move {
        tokio::select! {
            _ = stopped(&mut shutdown) => {}
            result = monitor(events) => {
                if let Err(e) = result {
                    error!("wake: logind subscription failed: {}, wake events will not be detected", e);
                }
            }
        }
        debug!("wake: logind monitor stopped");
    });

    (receiver, SourceHandle::idle(SOURCE).with_task(task))
}

async fn monitor(events: SignalSender) -> zbus::Result<()> {
    let connection = Connection::system().await?;
    let manager = Proxy::new(&connection, LOGIND_DESTINATION, LOGIND_PATH, LOGIND_MANAGER).await?;
    let mut signals = manager.receive_signal(PREPARE_FOR_SLEEP).await?;

    info!("wake: listening for logind sleep transitions");

    while let Some(message) = signals.next().await {
        match SleepTransition::from_message(&message) {
            Ok(SleepTransition::Resumed) => {
                info!("wake: system resumed from sleep");
                if !events.raise() {
                    debug!("wake: resume absorbed by pending signal");
                }
            }
            Ok(SleepTransition::Suspending) => debug!("wake: system going to sleep"),
            Err(e) => warn!("wake: malformed {} signal: {}", PREPARE_FOR_SLEEP, e),
        }
    }

    warn!("wake: logind signal stream ended, wake events will not be detected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare_for_sleep(start: bool) -> Message {
        Message::signal(LOGIND_PATH, LOGIND_MANAGER, PREPARE_FOR_SLEEP)
            .unwrap()
            .build(&start)
            .unwrap()
    }

    #[test]
    fn test_resume_signal() {
        let message = prepare_for_sleep(false);
        assert_eq!(
            SleepTransition::from_message(&message).unwrap(),
            SleepTransition::Resumed
        );
    }

    #[test]
    fn test_suspend_signal() {
        let message = prepare_for_sleep(true);
        assert_eq!(
            SleepTransition::from_message(&message).unwrap(),
            SleepTransition::Suspending
        );
    }

    #[test]
    fn test_wrong_argument_type_rejected() {
        let message = Message::signal(LOGIND_PATH, LOGIND_MANAGER, PREPARE_FOR_SLEEP)
            .unwrap()
            .build(&"false")
            .unwrap();
        assert!(SleepTransition::from_message(&message).is_err());
    }
}
