//! Adapter lifecycle state machine.
//!
//! Handles move `Closed -> Opening -> Open -> Closing -> Closed`, with
//! `Error` reachable from any state. Concurrent lifecycle transitions fail
//! fast rather than queue.

use parking_lot::Mutex;

use polystore_common::{Result, StorageError};

/// Observable lifecycle state of an adapter handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Closed,
    Opening,
    Open,
    Closing,
    Error,
}

impl AdapterState {
    pub const fn as_str(self) -> &'static str {
        match self {
            AdapterState::Closed => "closed",
            AdapterState::Opening => "opening",
            AdapterState::Open => "open",
            AdapterState::Closing => "closing",
            AdapterState::Error => "error",
        }
    }
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of starting a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ticket {
    /// The handle is already in the target state; the call is a no-op.
    AlreadyThere,
    /// The transition was claimed; the caller must finish or fail it.
    Proceed,
}

/// Guards lifecycle transitions for one adapter handle.
#[derive(Debug)]
pub struct LifecycleCell {
    kind: &'static str,
    state: Mutex<AdapterState>,
}

impl LifecycleCell {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: Mutex::new(AdapterState::Closed),
        }
    }

    pub fn state(&self) -> AdapterState {
        *self.state.lock()
    }

    /// Claims the `Opening` transition.
    pub fn begin_open(&self) -> Result<Ticket> {
        let mut state = self.state.lock();
        match *state {
            AdapterState::Open => Ok(Ticket::AlreadyThere),
            AdapterState::Opening => Err(StorageError::AlreadyOpening { kind: self.kind }),
            AdapterState::Closing => Err(StorageError::AlreadyClosing { kind: self.kind }),
            AdapterState::Closed | AdapterState::Error => {
                *state = AdapterState::Opening;
                Ok(Ticket::Proceed)
            }
        }
    }

    pub fn finish_open(&self) {
        *self.state.lock() = AdapterState::Open;
    }

    /// Claims the `Closing` transition.
    pub fn begin_close(&self) -> Result<Ticket> {
        let mut state = self.state.lock();
        match *state {
            AdapterState::Closed => Ok(Ticket::AlreadyThere),
            AdapterState::Closing => Err(StorageError::AlreadyClosing { kind: self.kind }),
            AdapterState::Opening => Err(StorageError::AlreadyOpening { kind: self.kind }),
            AdapterState::Open | AdapterState::Error => {
                *state = AdapterState::Closing;
                Ok(Ticket::Proceed)
            }
        }
    }

    pub fn finish_close(&self) {
        *self.state.lock() = AdapterState::Closed;
    }

    /// Marks the handle failed; any state may transition here.
    pub fn fail(&self) {
        *self.state.lock() = AdapterState::Error;
    }

    /// Fails unless the handle is `Open`.
    pub fn ensure_open(&self) -> Result<()> {
        match *self.state.lock() {
            AdapterState::Open => Ok(()),
            _ => Err(StorageError::NotOpen { kind: self.kind }),
        }
    }
}
