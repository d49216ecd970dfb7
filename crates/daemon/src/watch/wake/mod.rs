//! System wake event source
//!
//! Emits one signal each time the host resumes from sleep. macOS listens
//! on IOKit's root power domain, Linux follows logind's `PrepareForSleep`
//! signal. Other hosts get a source that never fires.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
pub use linux::spawn;
#[cfg(target_os = "macos")]
pub use macos::spawn;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn spawn(_shutdown: super::Shutdown) -> (common::SignalReceiver, super::SourceHandle) {
    tracing::warn!("wake: sleep/wake detection is not available on this platform");
    (common::SignalReceiver::never(), super::SourceHandle::idle("wake"))
}
