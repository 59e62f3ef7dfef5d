//! Process-wide traffic counters.
//!
//! Here a *message* means the payload of one successful receive or send
//! call, which may span several TCP segments (or be only part of what the
//! peer wrote).
//!
//! Counters only ever increase and nothing depends on two of them being
//! consistent with each other, so each one is an independent `AtomicU64`
//! updated with `Ordering::Relaxed`.  A [`StatsSnapshot`] taken while
//! sessions are running is eventually consistent, which is all `/status`
//! needs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by every session thread.
#[derive(Debug, Default)]
pub struct TrafficCounters {
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_echoed_back: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_echoed_back: AtomicU64,
}

/// Point-in-time copy of [`TrafficCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub messages_echoed_back: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub bytes_echoed_back: u64,
}

impl TrafficCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// An echo is also a send, so both sets of counters move.
    pub fn record_echoed(&self, bytes: usize) {
        self.record_sent(bytes);
        self.messages_echoed_back.fetch_add(1, Ordering::Relaxed);
        self.bytes_echoed_back.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_echoed_back: self.messages_echoed_back.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_echoed_back: self.bytes_echoed_back.load(Ordering::Relaxed),
        }
    }
}
