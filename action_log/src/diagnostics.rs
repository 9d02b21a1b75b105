//! Internal fault reporting.
//!
//! Faults the library catches on behalf of the application (a sink hook
//! panicking during flush, a periodic task failing, degraded exception
//! capture) are reported here and never raised into caller code. The
//! channel is the `log` facade, so applications pick the destination with
//! whatever `log` backend they already run.

use std::any::Any;

/// Report an internally-caught fault under a topic without raising it.
pub fn note(topic: &str, message: &str) {
    log::warn!(target: topic, "{message}");
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
