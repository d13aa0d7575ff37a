//! Conflicts and their resolution.
//!
//! A conflict is a row present on both sides with diverging `updated_at`.
//! Resolution decides which side's content survives locally; the push phase
//! then propagates local survivors outward.

use polystore_common::{Result, StorageError};
use polystore_core::{Row, SqlValue};

use crate::config::{ConflictStrategy, MergeFn};
use crate::record::{SyncRecord, ID_COLUMN};

/// Suffix appended to the remote twin's id under `KeepBoth`.
///
/// The derived id is stable: a later conflict on the same id overwrites the
/// previous twin instead of multiplying rows.
pub const KEEP_BOTH_SUFFIX: &str = "~remote";

/// How a single conflict was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution {
    /// The local row survived untouched.
    KeptLocal,
    /// The remote row overwrote the local one.
    TookRemote,
    /// A merged row replaced the local one.
    Merged,
    /// Both rows survive; the remote twin under a derived id.
    KeptBoth { derived_id: String },
}

/// A resolved conflict, as reported in the cycle result.
#[derive(Debug, Clone)]
pub struct SyncConflict {
    pub table: String,
    pub id: String,
    pub local: Row,
    pub remote: Row,
    pub resolution: ConflictResolution,
}

/// What the cycle must write after resolving.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    /// Nothing to write locally.
    None,
    /// Upsert this row locally under the record's own id.
    WriteLocal(Row),
    /// Insert this row locally under the derived id.
    WriteTwin { derived_id: String, row: Row },
}

/// Resolves one conflicting pair under the configured strategy.
pub fn resolve(
    table: &str,
    local: &SyncRecord,
    remote: &SyncRecord,
    strategy: ConflictStrategy,
    merge: Option<&MergeFn>,
) -> Result<(ConflictResolution, ConflictAction)> {
    match strategy {
        ConflictStrategy::LastWriteWins => {
            // Deterministic: greater instant wins, ties prefer remote.
            if remote.updated_at >= local.updated_at {
                Ok((
                    ConflictResolution::TookRemote,
                    ConflictAction::WriteLocal(remote.row.clone()),
                ))
            } else {
                Ok((ConflictResolution::KeptLocal, ConflictAction::None))
            }
        }
        ConflictStrategy::LocalWins => Ok((ConflictResolution::KeptLocal, ConflictAction::None)),
        ConflictStrategy::RemoteWins => Ok((
            ConflictResolution::TookRemote,
            ConflictAction::WriteLocal(remote.row.clone()),
        )),
        ConflictStrategy::Merge => {
            let merge = merge.ok_or_else(|| StorageError::MergeUnresolvable {
                table: table.to_string(),
                id: local.id.clone(),
                cause: "no merge function configured".to_string(),
            })?;
            let merged = merge(&local.row, &remote.row).map_err(|e| {
                StorageError::MergeUnresolvable {
                    table: table.to_string(),
                    id: local.id.clone(),
                    cause: e.to_string(),
                }
            })?;
            Ok((
                ConflictResolution::Merged,
                ConflictAction::WriteLocal(merged),
            ))
        }
        ConflictStrategy::KeepBoth => {
            let derived_id = format!("{}{}", local.id, KEEP_BOTH_SUFFIX);
            let mut twin = remote.row.clone();
            twin.insert(ID_COLUMN, SqlValue::Text(derived_id.clone()));
            Ok((
                ConflictResolution::KeptBoth {
                    derived_id: derived_id.clone(),
                },
                ConflictAction::WriteTwin {
                    derived_id,
                    row: twin,
                },
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::UPDATED_AT_COLUMN;
    use std::sync::Arc;

    fn record(id: &str, updated_at: i64, v: &str) -> SyncRecord {
        let mut row = Row::default();
        row.insert(ID_COLUMN, id);
        row.insert(UPDATED_AT_COLUMN, SqlValue::Integer(updated_at));
        row.insert("v", v);
        SyncRecord {
            id: id.to_string(),
            updated_at,
            row,
        }
    }

    #[test]
    fn test_last_write_wins_newer_remote() {
        let local = record("r1", 10, "L");
        let remote = record("r1", 20, "R");
        let (resolution, action) =
            resolve("t", &local, &remote, ConflictStrategy::LastWriteWins, None).unwrap();
        assert_eq!(resolution, ConflictResolution::TookRemote);
        assert!(matches!(action, ConflictAction::WriteLocal(_)));
    }

    #[test]
    fn test_last_write_wins_newer_local() {
        let local = record("r1", 30, "L");
        let remote = record("r1", 20, "R");
        let (resolution, action) =
            resolve("t", &local, &remote, ConflictStrategy::LastWriteWins, None).unwrap();
        assert_eq!(resolution, ConflictResolution::KeptLocal);
        assert_eq!(action, ConflictAction::None);
    }

    #[test]
    fn test_last_write_wins_tie_prefers_remote() {
        let local = record("r1", 20, "L");
        let remote = record("r1", 20, "R");
        let (resolution, _) =
            resolve("t", &local, &remote, ConflictStrategy::LastWriteWins, None).unwrap();
        assert_eq!(resolution, ConflictResolution::TookRemote);
    }

    #[test]
    fn test_local_and_remote_wins() {
        let local = record("r1", 10, "L");
        let remote = record("r1", 20, "R");

        let (resolution, action) =
            resolve("t", &local, &remote, ConflictStrategy::LocalWins, None).unwrap();
        assert_eq!(resolution, ConflictResolution::KeptLocal);
        assert_eq!(action, ConflictAction::None);

        let (resolution, _) =
            resolve("t", &local, &remote, ConflictStrategy::RemoteWins, None).unwrap();
        assert_eq!(resolution, ConflictResolution::TookRemote);
    }

    #[test]
    fn test_merge_without_function_is_unresolvable() {
        let local = record("r1", 10, "L");
        let remote = record("r1", 20, "R");
        let err = resolve("t", &local, &remote, ConflictStrategy::Merge, None).unwrap_err();
        assert!(matches!(err, StorageError::MergeUnresolvable { .. }));
    }

    #[test]
    fn test_merge_applies_function() {
        let local = record("r1", 10, "L");
        let remote = record("r1", 20, "R");
        let merge: MergeFn = Arc::new(|local, remote| {
            let mut merged = remote.clone();
            let combined = format!(
                "{}{}",
                local.text("v").unwrap_or_default(),
                remote.text("v").unwrap_or_default()
            );
            merged.insert("v", combined);
            Ok(merged)
        });

        let (resolution, action) =
            resolve("t", &local, &remote, ConflictStrategy::Merge, Some(&merge)).unwrap();
        assert_eq!(resolution, ConflictResolution::Merged);
        match action {
            ConflictAction::WriteLocal(row) => assert_eq!(row.text("v"), Some("LR")),
            other => panic!("expected local write, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_function_error_is_unresolvable() {
        let local = record("r1", 10, "L");
        let remote = record("r1", 20, "R");
        let merge: MergeFn =
            Arc::new(|_, _| Err(StorageError::Internal("cannot merge".to_string())));
        let err =
            resolve("t", &local, &remote, ConflictStrategy::Merge, Some(&merge)).unwrap_err();
        assert!(matches!(err, StorageError::MergeUnresolvable { .. }));
    }

    #[test]
    fn test_keep_both_derives_stable_id() {
        let local = record("r1", 10, "L");
        let remote = record("r1", 20, "R");
        let (resolution, action) =
            resolve("t", &local, &remote, ConflictStrategy::KeepBoth, None).unwrap();

        match (&resolution, &action) {
            (
                ConflictResolution::KeptBoth { derived_id },
                ConflictAction::WriteTwin { row, .. },
            ) => {
                assert_eq!(derived_id, "r1~remote");
                assert_eq!(row.text(ID_COLUMN), Some("r1~remote"));
                assert_eq!(row.text("v"), Some("R"));
            }
            other => panic!("unexpected resolution {other:?}"),
        }
    }
}
