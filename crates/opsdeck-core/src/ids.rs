//! Identifier and version generation.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);
static LAST_VERSION: AtomicU64 = AtomicU64::new(0);

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    Utc::now().timestamp_micros().max(0) as u64
}

/// Generate a unique id such as `mig_00061f1c3b0a2e4c0000002a`.
///
/// The leading eight bytes are the creation timestamp, so ids sort
/// chronologically as strings.
pub fn generate_id(prefix: &str) -> String {
    let ts = current_timestamp();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) as u32;
    let mut id = [0u8; 12];
    id[0..8].copy_from_slice(&ts.to_be_bytes());
    id[8..12].copy_from_slice(&seq.to_be_bytes());
    format!("{}_{}", prefix, hex::encode(id))
}

/// Next time-derived version number.
///
/// Strictly increasing within a process even when the clock does not
/// advance between calls.
pub fn next_version() -> u64 {
    let now = current_timestamp();
    let mut last = LAST_VERSION.load(Ordering::SeqCst);
    loop {
        let candidate = now.max(last + 1);
        match LAST_VERSION.compare_exchange_weak(last, candidate, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}
