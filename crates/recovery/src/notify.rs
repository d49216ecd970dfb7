//! Outcome notification seam

/// Fire-and-forget sink for one-line operator notifications
///
/// Implementations must not block for long and must swallow their own
/// failures; nothing the sink does may affect a recovery outcome.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}
