//! Open/closed state shared by every shutdown-capable source.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ConnectionError, ConnectionResult};

/// The state of a connection source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceState {
    /// Accepting acquisitions.
    Open,
    /// Shut down. Terminal.
    Closed,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Open => write!(f, "open"),
            SourceState::Closed => write!(f, "closed"),
        }
    }
}

/// One-way `Open -> Closed` transition.
#[derive(Debug, Default)]
pub struct Lifecycle {
    closed: AtomicBool,
}

impl Lifecycle {
    /// Creates an open lifecycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    pub fn state(&self) -> SourceState {
        if self.closed.load(Ordering::Acquire) {
            SourceState::Closed
        } else {
            SourceState::Open
        }
    }

    /// Returns `true` once closed.
    pub fn is_closed(&self) -> bool {
        self.state() == SourceState::Closed
    }

    /// Fails with [`ConnectionError::Closed`] once closed.
    pub fn ensure_open(&self) -> ConnectionResult<()> {
        match self.state() {
            SourceState::Open => Ok(()),
            SourceState::Closed => Err(ConnectionError::Closed),
        }
    }

    /// Closes the lifecycle. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}
