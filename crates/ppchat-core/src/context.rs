//! Process-wide state shared by every thread.
//!
//! One `SharedContext` is created at startup, wrapped in an `Arc`, and a
//! clone of that `Arc` is moved into every thread entry point (console
//! reader, accept loop, each session).  Nothing here needs a lock: the quit
//! and echo flags are atomic booleans and the counters are atomics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::stats::TrafficCounters;

/// Flags, counters and start time for one running process.
#[derive(Debug)]
pub struct SharedContext {
    quit: AtomicBool,
    echo_back: AtomicBool,
    stats: TrafficCounters,
    started_at: DateTime<Local>,
    started: Instant,
}

impl SharedContext {
    /// Creates a context with echo disabled, wrapped in an `Arc`.
    pub fn new() -> Arc<Self> {
        Self::with_echo(false)
    }

    /// Creates a context with the echo flag preset.
    pub fn with_echo(echo_back: bool) -> Arc<Self> {
        Arc::new(Self {
            quit: AtomicBool::new(false),
            echo_back: AtomicBool::new(echo_back),
            stats: TrafficCounters::new(),
            started_at: Local::now(),
            started: Instant::now(),
        })
    }

    /// Raises the cooperative shutdown flag.  Threads notice it between
    /// blocking calls.
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    pub fn is_quit(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// Flips the echo flag and returns the new value.
    pub fn toggle_echo(&self) -> bool {
        !self.echo_back.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn set_echo(&self, enabled: bool) {
        self.echo_back.store(enabled, Ordering::SeqCst);
    }

    pub fn echo_enabled(&self) -> bool {
        self.echo_back.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &TrafficCounters {
        &self.stats
    }

    /// Start time rendered for status lines, e.g. `2024-05-01 13:37:00`.
    pub fn started_at_text(&self) -> String {
        self.started_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Formats a duration as `"1d 2h 3m 4s"`, omitting leading zero units.
///
/// Anything under a second renders as `"0s"`.
pub fn format_time_span(span: Duration) -> String {
    let total = span.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if days > 0 || hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if days > 0 || hours > 0 || minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}
