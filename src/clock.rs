//! Monotonic wall-clock reader plus thread-local formatting caches.
//!
//! `%r` (elapsed ms) is measured against a process-start instant captured the
//! first time this module is touched; `%d{...}` timestamps are formatted
//! through `chrono`, with a per-thread cache so that rendering many records
//! within the same wall-clock second does not re-run `strftime`.

use std::cell::RefCell;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chrono::{Local, TimeZone};

lazy_static::lazy_static! {
    static ref PROCESS_START: Instant = Instant::now();
}

/// Milliseconds elapsed since this process first touched the clock module.
pub fn elapsed_ms_since_start() -> u64 {
    PROCESS_START.elapsed().as_millis() as u64
}

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Raw OS thread id (`gettid()` on Linux, a process-local counter elsewhere).
#[cfg(target_os = "linux")]
pub fn gettid() -> u32 {
    unsafe { libc::syscall(libc::SYS_gettid) as u32 }
}

#[cfg(not(target_os = "linux"))]
pub fn gettid() -> u32 {
    thread_local! {
        static TID: u32 = allocate_synthetic_tid();
    }
    TID.with(|tid| *tid)
}

#[cfg(not(target_os = "linux"))]
fn allocate_synthetic_tid() -> u32 {
    use std::sync::atomic::{AtomicU32, Ordering};
    static NEXT: AtomicU32 = AtomicU32::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

thread_local! {
    // (whole seconds, sub-pattern, formatted prefix without the ms.us suffix)
    static DATETIME_CACHE: RefCell<Option<(i64, String, String)>> = RefCell::new(None);
}

/// Formats `micros` (microseconds since the Unix epoch) with `sub_pattern`
/// (a `strftime`-style format, applied to the whole-second part) and appends
/// a `.mmm.uuu` millisecond+microsecond suffix, per the `%d{sub}` specifier.
pub fn format_timestamp(micros: u64, sub_pattern: &str) -> String {
    let seconds = (micros / 1_000_000) as i64;
    let sub_micros = (micros % 1_000_000) as u32;
    let ms = sub_micros / 1_000;
    let us = sub_micros % 1_000;

    let base = DATETIME_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some((cached_secs, cached_pattern, cached_str)) = cache.as_ref() {
            if *cached_secs == seconds && cached_pattern == sub_pattern {
                return cached_str.clone();
            }
        }
        let formatted = Local
            .timestamp_opt(seconds, 0)
            .single()
            .map(|dt| dt.format(sub_pattern).to_string())
            .unwrap_or_default();
        *cache = Some((seconds, sub_pattern.to_string(), formatted.clone()));
        formatted
    });

    format!("{}.{:03}.{:03}", base, ms, us)
}
