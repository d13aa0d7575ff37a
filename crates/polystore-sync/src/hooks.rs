//! Callback hooks.
//!
//! Hooks fire from the manager task, never reentrantly: a callback runs to
//! completion before the cycle proceeds.

use polystore_common::StorageError;

use crate::conflict::SyncConflict;
use crate::result::SyncResult;

/// Per-table progress of a running cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProgress {
    pub table: String,
    /// 1-based index of the table within the cycle.
    pub index: usize,
    pub total: usize,
}

type SyncCb = Box<dyn Fn(&SyncResult) + Send + Sync>;
type ConflictCb = Box<dyn Fn(&SyncConflict) + Send + Sync>;
type ErrorCb = Box<dyn Fn(&StorageError) + Send + Sync>;
type ProgressCb = Box<dyn Fn(&SyncProgress) + Send + Sync>;
type ConnectivityCb = Box<dyn Fn() + Send + Sync>;

/// Optional observer callbacks.
#[derive(Default)]
pub struct SyncHooks {
    pub(crate) on_sync: Option<SyncCb>,
    pub(crate) on_conflict: Option<ConflictCb>,
    pub(crate) on_offline: Option<ConnectivityCb>,
    pub(crate) on_online: Option<ConnectivityCb>,
    pub(crate) on_error: Option<ErrorCb>,
    pub(crate) on_progress: Option<ProgressCb>,
}

impl std::fmt::Debug for SyncHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHooks")
            .field("on_sync", &self.on_sync.is_some())
            .field("on_conflict", &self.on_conflict.is_some())
            .field("on_offline", &self.on_offline.is_some())
            .field("on_online", &self.on_online.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl SyncHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_sync(mut self, cb: impl Fn(&SyncResult) + Send + Sync + 'static) -> Self {
        self.on_sync = Some(Box::new(cb));
        self
    }

    pub fn on_conflict(mut self, cb: impl Fn(&SyncConflict) + Send + Sync + 'static) -> Self {
        self.on_conflict = Some(Box::new(cb));
        self
    }

    pub fn on_offline(mut self, cb: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_offline = Some(Box::new(cb));
        self
    }

    pub fn on_online(mut self, cb: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_online = Some(Box::new(cb));
        self
    }

    pub fn on_error(mut self, cb: impl Fn(&StorageError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(cb));
        self
    }

    pub fn on_progress(mut self, cb: impl Fn(&SyncProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    pub(crate) fn emit_sync(&self, result: &SyncResult) {
        if let Some(cb) = &self.on_sync {
            cb(result);
        }
    }

    pub(crate) fn emit_conflict(&self, conflict: &SyncConflict) {
        if let Some(cb) = &self.on_conflict {
            cb(conflict);
        }
    }

    pub(crate) fn emit_offline(&self) {
        if let Some(cb) = &self.on_offline {
            cb();
        }
    }

    pub(crate) fn emit_online(&self) {
        if let Some(cb) = &self.on_online {
            cb();
        }
    }

    pub(crate) fn emit_error(&self, error: &StorageError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_progress(&self, progress: &SyncProgress) {
        if let Some(cb) = &self.on_progress {
            cb(progress);
        }
    }
}
