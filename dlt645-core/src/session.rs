//! Connection state tracking
//!
//! A session mirrors the state of one exclusive link to a meter:
//! - Connected / disconnected
//! - How many times the link was (re)established
//! - Completed request/response cycles
//!
//! It is readable without holding the link's I/O lock, which lets callers and
//! tests probe the state while a cycle is in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No open channel
    Disconnected,

    /// Channel open, ready for requests
    Connected,
}

/// Session tracker
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Times the channel was opened
    connects: AtomicU64,

    /// Completed request/response cycles
    cycles: AtomicU64,

    /// Current link state
    state: parking_lot::RwLock<ConnectionState>,
}

impl Session {
    /// Create a new disconnected session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                connects: AtomicU64::new(0),
                cycles: AtomicU64::new(0),
                state: parking_lot::RwLock::new(ConnectionState::Disconnected),
            }),
        }
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        matches!(self.state(), ConnectionState::Connected)
    }

    /// Mark the channel as open
    ///
    /// Returns `false` if it already was.
    pub fn connected(&self) -> bool {
        let mut state = self.inner.state.write();

        if *state == ConnectionState::Connected {
            return false;
        }

        self.inner.connects.fetch_add(1, Ordering::AcqRel);
        *state = ConnectionState::Connected;
        true
    }

    /// Mark the channel as closed
    pub fn close(&self) {
        *self.inner.state.write() = ConnectionState::Disconnected;
    }

    /// Record a completed request/response cycle
    pub fn record_cycle(&self) -> u64 {
        self.inner.cycles.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of times the channel was opened
    pub fn connects(&self) -> u64 {
        self.inner.connects.load(Ordering::Acquire)
    }

    /// Number of completed request/response cycles
    pub fn cycles(&self) -> u64 {
        self.inner.cycles.load(Ordering::Acquire)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
