//! Cycle results.

use chrono::{DateTime, Utc};

use crate::conflict::SyncConflict;

/// Outcome of one sync cycle.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub success: bool,
    pub records_synced: u64,
    pub conflicts: Vec<SyncConflict>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl SyncResult {
    pub(crate) fn empty() -> Self {
        Self {
            success: true,
            records_synced: 0,
            conflicts: Vec::new(),
            errors: Vec::new(),
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    /// Result of a cycle skipped because the remote was unreachable.
    pub(crate) fn offline() -> Self {
        Self {
            success: false,
            errors: vec!["remote unreachable; cycle skipped".to_string()],
            ..Self::empty()
        }
    }

    /// Result of a `sync()` call on a manager with no remote configured.
    pub(crate) fn no_remote() -> Self {
        Self {
            success: false,
            errors: vec!["no remote adapter configured".to_string()],
            ..Self::empty()
        }
    }

    pub fn is_offline(&self) -> bool {
        !self.success && self.errors.iter().any(|e| e.contains("unreachable"))
    }
}
