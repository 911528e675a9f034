//! Error taxonomy for capture-session startup.
//!
//! All three variants are fatal to `start()` and are surfaced without retry;
//! the caller decides whether to prompt the user and try again. Once a session
//! is capturing, hot-path failures are logged and dropped instead of raised.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// No capture source matched the requested selector.
    #[error("no matching capture source: {0}")]
    DeviceUnavailable(String),

    /// The platform refused access to the device.
    #[error("capture permission denied: {0}")]
    PermissionDenied(String),

    /// The audio graph could not be allocated or started.
    #[error("unable to allocate audio graph: {0}")]
    ResourceExhausted(String),
}

/// Sort a backend-specific error message into the taxonomy. cpal reports
/// permission failures as opaque backend strings on every host, so this is a
/// keyword match rather than a variant match.
pub(crate) fn classify_backend_message(msg: &str) -> CaptureError {
    let lowered = msg.to_ascii_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") || lowered.contains("not allowed")
    {
        CaptureError::PermissionDenied(msg.to_string())
    } else {
        CaptureError::ResourceExhausted(msg.to_string())
    }
}
