//! Sync policy configuration.

use std::sync::Arc;
use std::time::Duration;

use polystore_common::Result;
use polystore_core::Row;

/// Caller-supplied merge function for the `Merge` strategy.
pub type MergeFn = Arc<dyn Fn(&Row, &Row) -> Result<Row> + Send + Sync>;

/// When sync cycles run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Only explicit `sync()` calls.
    #[default]
    Manual,
    /// Debounced on primary mutation.
    Auto,
    /// Fixed interval.
    Periodic,
    /// Every mutation schedules a cycle.
    Realtime,
    /// Connectivity restoration triggers a cycle.
    OnReconnect,
}

/// Which way records flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncDirection {
    #[default]
    Bidirectional,
    PushOnly,
    PullOnly,
}

impl SyncDirection {
    pub fn includes_pull(self) -> bool {
        matches!(self, SyncDirection::Bidirectional | SyncDirection::PullOnly)
    }

    pub fn includes_push(self) -> bool {
        matches!(self, SyncDirection::Bidirectional | SyncDirection::PushOnly)
    }
}

/// How a conflicting row pair is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStrategy {
    /// Greater `updated_at` wins; ties prefer remote.
    #[default]
    LastWriteWins,
    LocalWins,
    RemoteWins,
    /// Caller-supplied merge function.
    Merge,
    /// The remote row is inserted under a derived id; both survive.
    KeepBoth,
}

/// What happens when the storage budget is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageLimitAction {
    /// Report through the error hook and continue.
    #[default]
    Warn,
    /// Fail the cycle.
    Error,
    /// Delete the oldest records until within budget.
    Prune,
}

/// Relative importance of a table; higher syncs earlier and prunes later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TablePriority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl TablePriority {
    /// Sort rank: lower syncs first.
    pub fn rank(self) -> u8 {
        match self {
            TablePriority::Critical => 0,
            TablePriority::High => 1,
            TablePriority::Medium => 2,
            TablePriority::Low => 3,
        }
    }
}

/// Per-table sync overrides. Declaration order breaks priority ties.
#[derive(Debug, Clone)]
pub struct TableSync {
    pub name: String,
    pub priority: TablePriority,
    /// Cap on records pulled per cycle.
    pub max_records: Option<u64>,
    /// Exclude the table from sync.
    pub skip: bool,
}

impl TableSync {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: TablePriority::default(),
            max_records: None,
            skip: false,
        }
    }

    pub fn priority(mut self, priority: TablePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_records(mut self, max: u64) -> Self {
        self.max_records = Some(max);
        self
    }

    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }
}

/// The whole sync policy.
#[derive(Clone, Default)]
pub struct SyncPolicy {
    pub mode: SyncMode,
    pub direction: SyncDirection,
    pub strategy: ConflictStrategy,
    /// Required when `strategy` is `Merge`.
    pub merge: Option<MergeFn>,
    /// Cycle period for `Periodic`.
    pub interval: Option<Duration>,
    /// Quiet time after a mutation for `Auto`.
    pub debounce: Option<Duration>,
    /// Connectivity probe period.
    pub probe_interval: Option<Duration>,
    /// Storage budget for the primary, in megabytes of on-disk footprint
    /// (or thousands of rows where the backend exposes no file).
    pub storage_limit_mb: Option<u64>,
    pub limit_action: StorageLimitAction,
    /// Synced tables in declaration order; empty means discover all.
    pub tables: Vec<TableSync>,
    /// Fail the cycle on row-count discrepancies after sync.
    pub strict_verification: bool,
}

impl std::fmt::Debug for SyncPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPolicy")
            .field("mode", &self.mode)
            .field("direction", &self.direction)
            .field("strategy", &self.strategy)
            .field("merge", &self.merge.as_ref().map(|_| "<fn>"))
            .field("interval", &self.interval)
            .field("debounce", &self.debounce)
            .field("storage_limit_mb", &self.storage_limit_mb)
            .field("limit_action", &self.limit_action)
            .field("tables", &self.tables)
            .field("strict_verification", &self.strict_verification)
            .finish()
    }
}

impl SyncPolicy {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1_000);
    pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(15);

    pub fn interval(&self) -> Duration {
        self.interval.unwrap_or(Self::DEFAULT_INTERVAL)
    }

    pub fn debounce(&self) -> Duration {
        self.debounce.unwrap_or(Self::DEFAULT_DEBOUNCE)
    }

    pub fn probe_interval(&self) -> Duration {
        self.probe_interval.unwrap_or(Self::DEFAULT_PROBE_INTERVAL)
    }

    /// Tables in sync order: priority rank, then declaration order.
    /// Skipped tables are omitted.
    pub fn ordered_tables(&self) -> Vec<TableSync> {
        let mut tables: Vec<TableSync> =
            self.tables.iter().filter(|t| !t.skip).cloned().collect();
        tables.sort_by_key(|t| t.priority.rank());
        tables
    }

    /// The override record for a table, if declared.
    pub fn table(&self, name: &str) -> Option<&TableSync> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_predicates() {
        assert!(SyncDirection::Bidirectional.includes_pull());
        assert!(SyncDirection::Bidirectional.includes_push());
        assert!(SyncDirection::PullOnly.includes_pull());
        assert!(!SyncDirection::PullOnly.includes_push());
        assert!(!SyncDirection::PushOnly.includes_pull());
    }

    #[test]
    fn test_ordered_tables_priority_then_declaration() {
        let policy = SyncPolicy {
            tables: vec![
                TableSync::new("notes"),
                TableSync::new("settings").priority(TablePriority::Critical),
                TableSync::new("cache").priority(TablePriority::Low),
                TableSync::new("messages").priority(TablePriority::Critical),
                TableSync::new("drafts").skip(),
            ],
            ..Default::default()
        };

        let order: Vec<String> = policy
            .ordered_tables()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(order, vec!["settings", "messages", "notes", "cache"]);
    }

    #[test]
    fn test_defaults() {
        let policy = SyncPolicy::default();
        assert_eq!(policy.mode, SyncMode::Manual);
        assert_eq!(policy.direction, SyncDirection::Bidirectional);
        assert_eq!(policy.strategy, ConflictStrategy::LastWriteWins);
        assert_eq!(policy.interval(), SyncPolicy::DEFAULT_INTERVAL);
        assert!(!policy.strict_verification);
    }
}
