//! Process-wide insecure-TLS warning latch.
//!
//! Once any endpoint is configured without certificate validation the
//! warning is silenced for the rest of the process. The latch never resets.

use std::sync::atomic::{AtomicBool, Ordering};

static INSECURE_WARNINGS_SILENCED: AtomicBool = AtomicBool::new(false);

pub fn silence_insecure_warnings() {
    INSECURE_WARNINGS_SILENCED.store(true, Ordering::SeqCst);
}

pub fn insecure_warnings_silenced() -> bool {
    INSECURE_WARNINGS_SILENCED.load(Ordering::SeqCst)
}

/// Emit the insecure-request warning for `host` unless the latch is set.
pub(crate) fn warn_insecure_request(host: &str) {
    if !insecure_warnings_silenced() {
        tracing::warn!(host, "Unverified HTTPS request; certificate validation is disabled");
    }
}
