//! Storage budget enforcement.
//!
//! The budget is measured against the primary's on-disk footprint when its
//! descriptor names a file; otherwise total row count across the synced
//! tables stands in, with the limit read as thousands of rows. Exceeding
//! the budget triggers the configured action: warn through the error hook,
//! fail the cycle, or prune the oldest rows (lowest-priority tables first).

use tracing::{info, warn};

use polystore_common::{Result, StorageError};
use polystore_core::{Params, StorageAdapter};

use crate::config::{StorageLimitAction, SyncPolicy, TableSync};
use crate::hooks::SyncHooks;
use crate::sql;

const PRUNE_BATCH: u64 = 100;
const MAX_PRUNE_PASSES: u32 = 64;

/// How far usage is over the configured limit, in the measured unit.
struct Usage {
    used: u64,
    limit: u64,
    unit: &'static str,
}

impl Usage {
    fn exceeded(&self) -> bool {
        self.used > self.limit
    }

    fn describe(&self) -> (String, String) {
        (
            format!("{} {}", self.used, self.unit),
            format!("{} {}", self.limit, self.unit),
        )
    }
}

async fn measure(
    primary: &dyn StorageAdapter,
    tables: &[TableSync],
    limit_mb: u64,
) -> Result<Usage> {
    if let Some(path) = primary.context().file_path() {
        if let Ok(meta) = std::fs::metadata(path) {
            return Ok(Usage {
                used: meta.len(),
                limit: limit_mb.saturating_mul(1024 * 1024),
                unit: "bytes",
            });
        }
    }

    // Row-count surrogate: the limit reads as thousands of rows.
    let mut used = 0u64;
    for table in tables {
        let row = primary
            .get(&sql::count_rows(&table.name)?, Params::none())
            .await?;
        used += row
            .and_then(|r| r.integer("n"))
            .unwrap_or(0)
            .max(0) as u64;
    }
    Ok(Usage {
        used,
        limit: limit_mb.saturating_mul(1000),
        unit: "rows",
    })
}

/// Enforces the storage budget before a cycle. Returns diagnostics to fold
/// into the cycle result.
pub(crate) async fn enforce(
    primary: &dyn StorageAdapter,
    tables: &[TableSync],
    policy: &SyncPolicy,
    hooks: &SyncHooks,
) -> Result<Vec<String>> {
    let Some(limit_mb) = policy.storage_limit_mb else {
        return Ok(Vec::new());
    };

    let usage = measure(primary, tables, limit_mb).await?;
    if !usage.exceeded() {
        return Ok(Vec::new());
    }

    let (used, limit) = usage.describe();
    let over_budget = StorageError::BudgetExceeded {
        used: used.clone(),
        limit: limit.clone(),
    };

    match policy.limit_action {
        StorageLimitAction::Warn => {
            warn!(%used, %limit, "storage budget exceeded");
            hooks.emit_error(&over_budget);
            Ok(vec![over_budget.to_string()])
        }
        StorageLimitAction::Error => Err(over_budget),
        StorageLimitAction::Prune => {
            let pruned = prune(primary, tables, limit_mb).await?;
            info!(pruned, %used, %limit, "storage budget enforced by pruning");
            Ok(vec![format!(
                "storage budget exceeded ({used} > {limit}); pruned {pruned} rows"
            )])
        }
    }
}

/// Deletes the oldest rows, lowest-priority tables first, until usage fits.
async fn prune(
    primary: &dyn StorageAdapter,
    tables: &[TableSync],
    limit_mb: u64,
) -> Result<u64> {
    // Reverse sync order: low priority prunes first.
    let mut reversed: Vec<&TableSync> = tables.iter().collect();
    reversed.reverse();

    let mut pruned = 0u64;
    for _ in 0..MAX_PRUNE_PASSES {
        if !measure(primary, tables, limit_mb).await?.exceeded() {
            return Ok(pruned);
        }
        let mut deleted_this_pass = 0u64;
        for table in &reversed {
            let result = primary
                .run(&sql::delete_oldest(&table.name, PRUNE_BATCH)?, Params::none())
                .await?;
            deleted_this_pass += result.changes;
            pruned += result.changes;
            if !measure(primary, tables, limit_mb).await?.exceeded() {
                return Ok(pruned);
            }
        }
        if deleted_this_pass == 0 {
            // Nothing left to delete; footprint cannot shrink further.
            break;
        }
    }
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_exceeded() {
        let usage = Usage {
            used: 11,
            limit: 10,
            unit: "rows",
        };
        assert!(usage.exceeded());
        let (used, limit) = usage.describe();
        assert_eq!(used, "11 rows");
        assert_eq!(limit, "10 rows");
    }
}
