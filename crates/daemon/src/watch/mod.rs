//! Host event sources
//!
//! Each source owns the sending half of a single-slot signal channel and
//! runs on its own thread or task. A source that cannot start logs why and
//! hands the dispatcher a receiver that never fires, so the rest of the
//! daemon keeps working on whatever sources remain.

pub mod hotplug;
pub mod manual;
pub mod wake;

use tracing::{debug, error};

/// Shutdown broadcast shared by every source
pub type Shutdown = tokio::sync::watch::Receiver<bool>;

/// Resolve once shutdown has been requested or the sender is gone
pub async fn stopped(shutdown: &mut Shutdown) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Handle to a running event source
pub struct SourceHandle {
    name: &'static str,
    thread: Option<std::thread::JoinHandle<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl SourceHandle {
    /// A source with nothing running
    pub fn idle(name: &'static str) -> Self {
        Self {
            name,
            thread: None,
            task: None,
        }
    }

    pub fn with_thread(mut self, thread: std::thread::JoinHandle<()>) -> Self {
        self.thread = Some(thread);
        self
    }

    pub fn with_task(mut self, task: tokio::task::JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the source to finish tearing down
    ///
    /// Call after shutdown has been signalled; the task (if any) is joined
    /// first since it is what delivers the stop request to the thread.
    pub async fn join(self) {
        let name = self.name;

        if let Some(task) = self.task
            && let Err(e) = task.await
        {
            error!("{}: task failed: {}", name, e);
        }

        if let Some(thread) = self.thread {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("{}: worker thread panicked: {:?}", name, e),
                Err(e) => error!("{}: failed to join worker thread: {}", name, e),
            }
        }

        debug!("{}: source stopped", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{DEFAULT_TEST_TIMEOUT, with_timeout};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_stopped_resolves_on_signal() {
        let (tx, mut rx) = tokio::sync::watch::channel(false);
        let waiter = tokio::spawn(async move { stopped(&mut rx).await });

        tx.send(true).unwrap();
        with_timeout(DEFAULT_TEST_TIMEOUT, waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stopped_resolves_when_sender_dropped() {
        let (tx, mut rx) = tokio::sync::watch::channel(false);
        drop(tx);
        with_timeout(DEFAULT_TEST_TIMEOUT, stopped(&mut rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_join_waits_for_thread_and_task() {
        let thread_done = Arc::new(AtomicBool::new(false));
        let flag = thread_done.clone();
        let thread = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            flag.store(true, Ordering::SeqCst);
        });
        let task = tokio::spawn(async {});

        let handle = SourceHandle::idle("test").with_thread(thread).with_task(task);
        assert_eq!(handle.name(), "test");
        with_timeout(DEFAULT_TEST_TIMEOUT, handle.join())
            .await
            .unwrap();
        assert!(thread_done.load(Ordering::SeqCst));
    }
}
