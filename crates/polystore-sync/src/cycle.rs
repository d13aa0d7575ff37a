//! The sync cycle.
//!
//! One end-to-end pass: storage budget, then every synced table in priority
//! order (pull, conflict resolution, push), then verification. The caller
//! has already probed connectivity; a set cancel flag aborts the cycle at
//! the next table boundary with partial progress kept.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use polystore_common::{Result, StorageError};
use polystore_core::{Params, StorageAdapter};

use crate::budget;
use crate::config::{SyncPolicy, TableSync};
use crate::conflict::{self, ConflictAction, SyncConflict};
use crate::export::list_tables;
use crate::hooks::{SyncHooks, SyncProgress};
use crate::record::SyncRecord;
use crate::result::SyncResult;
use crate::sql;

/// Everything one cycle needs.
pub(crate) struct CycleContext<'a> {
    pub primary: &'a dyn StorageAdapter,
    pub remote: &'a dyn StorageAdapter,
    pub policy: &'a SyncPolicy,
    pub hooks: &'a SyncHooks,
    /// Per-table high-water mark of pushed `updated_at` instants.
    pub stamps: &'a mut HashMap<String, i64>,
    pub cancel: &'a AtomicBool,
}

#[derive(Default)]
struct TableOutcome {
    synced: u64,
    conflicts: Vec<SyncConflict>,
    diagnostics: Vec<String>,
}

/// Runs one sync cycle.
pub(crate) async fn run(mut ctx: CycleContext<'_>) -> SyncResult {
    let started = Instant::now();
    let mut result = SyncResult::empty();

    let tables = match sync_tables(ctx.primary, ctx.policy).await {
        Ok(tables) => tables,
        Err(err) => {
            ctx.hooks.emit_error(&err);
            return fail(result, started, err);
        }
    };

    match budget::enforce(ctx.primary, &tables, ctx.policy, ctx.hooks).await {
        Ok(diagnostics) => result.errors.extend(diagnostics),
        Err(err) => {
            ctx.hooks.emit_error(&err);
            return fail(result, started, err);
        }
    }

    let total = tables.len();
    for (index, table) in tables.iter().enumerate() {
        if ctx.cancel.load(Ordering::SeqCst) {
            info!(table = %table.name, "cycle aborted at table boundary");
            result
                .errors
                .push("cycle aborted; partial progress kept".to_string());
            break;
        }

        ctx.hooks.emit_progress(&SyncProgress {
            table: table.name.clone(),
            index: index + 1,
            total,
        });

        match sync_table(&mut ctx, table).await {
            Ok(outcome) => {
                result.records_synced += outcome.synced;
                for conflict in &outcome.conflicts {
                    ctx.hooks.emit_conflict(conflict);
                }
                result.conflicts.extend(outcome.conflicts);
                result.errors.extend(outcome.diagnostics);
            }
            Err(err) => {
                warn!(table = %table.name, error = %err, "table sync failed");
                ctx.hooks.emit_error(&err);
                result.errors.push(format!("{}: {err}", table.name));
                result.success = false;
            }
        }
    }

    if !ctx.cancel.load(Ordering::SeqCst) {
        if let Err(err) = verify(&ctx, &tables, &mut result).await {
            ctx.hooks.emit_error(&err);
            result.errors.push(err.to_string());
            result.success = false;
        }
    }

    result.duration_ms = started.elapsed().as_millis() as u64;
    result.timestamp = Utc::now();
    result
}

fn fail(mut result: SyncResult, started: Instant, err: StorageError) -> SyncResult {
    result.success = false;
    result.errors.push(err.to_string());
    result.duration_ms = started.elapsed().as_millis() as u64;
    result.timestamp = Utc::now();
    result
}

/// The table list for this cycle: configured overrides in priority order,
/// or catalog discovery when none are declared.
async fn sync_tables(
    primary: &dyn StorageAdapter,
    policy: &SyncPolicy,
) -> Result<Vec<TableSync>> {
    if policy.tables.is_empty() {
        Ok(list_tables(primary)
            .await?
            .into_iter()
            .map(TableSync::new)
            .collect())
    } else {
        Ok(policy.ordered_tables())
    }
}

async fn sync_table(ctx: &mut CycleContext<'_>, table: &TableSync) -> Result<TableOutcome> {
    let mut outcome = TableOutcome::default();
    let name = table.name.as_str();

    if ctx.policy.direction.includes_pull() {
        pull_table(ctx, table, &mut outcome).await?;
    }

    if ctx.policy.direction.includes_push() {
        push_table(ctx, name, &mut outcome).await?;
    }

    debug!(
        table = name,
        synced = outcome.synced,
        conflicts = outcome.conflicts.len(),
        "table synced"
    );
    Ok(outcome)
}

/// Loads a table into records keyed by id, collecting diagnostics for rows
/// the sync contract rejects.
async fn load_records(
    adapter: &dyn StorageAdapter,
    name: &str,
    max_records: Option<u64>,
    diagnostics: &mut Vec<String>,
) -> Result<Vec<SyncRecord>> {
    let rows = adapter
        .all(&sql::select_all(name, max_records)?, Params::none())
        .await?;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match SyncRecord::from_row(name, row) {
            Ok(record) => records.push(record),
            Err(err) => diagnostics.push(err.to_string()),
        }
    }
    Ok(records)
}

async fn pull_table(
    ctx: &CycleContext<'_>,
    table: &TableSync,
    outcome: &mut TableOutcome,
) -> Result<()> {
    let name = table.name.as_str();
    let remote_records = load_records(
        ctx.remote,
        name,
        table.max_records,
        &mut outcome.diagnostics,
    )
    .await?;
    let local_records =
        load_records(ctx.primary, name, None, &mut outcome.diagnostics).await?;

    let local_by_id: HashMap<String, SyncRecord> = local_records
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();

    for remote_record in remote_records {
        match local_by_id.get(&remote_record.id) {
            None => {
                let (sql, params) = sql::upsert(name, &remote_record.row)?;
                ctx.primary.run(&sql, params).await?;
                outcome.synced += 1;
            }
            Some(local_record) if local_record.updated_at != remote_record.updated_at => {
                let (resolution, action) = conflict::resolve(
                    name,
                    local_record,
                    &remote_record,
                    ctx.policy.strategy,
                    ctx.policy.merge.as_ref(),
                )?;

                match action {
                    ConflictAction::None => {}
                    ConflictAction::WriteLocal(row) => {
                        let (sql, params) = sql::upsert(name, &row)?;
                        ctx.primary.run(&sql, params).await?;
                        outcome.synced += 1;
                    }
                    ConflictAction::WriteTwin { row, .. } => {
                        let (sql, params) = sql::upsert(name, &row)?;
                        ctx.primary.run(&sql, params).await?;
                        outcome.synced += 1;
                    }
                }

                outcome.conflicts.push(SyncConflict {
                    table: name.to_string(),
                    id: remote_record.id.clone(),
                    local: local_record.row.clone(),
                    remote: remote_record.row.clone(),
                    resolution,
                });
            }
            // Equal instants: the records are considered in sync.
            Some(_) => {}
        }
    }
    Ok(())
}

async fn push_table(
    ctx: &mut CycleContext<'_>,
    name: &str,
    outcome: &mut TableOutcome,
) -> Result<()> {
    let since = ctx.stamps.get(name).copied().unwrap_or(0);
    let local_records =
        load_records(ctx.primary, name, None, &mut outcome.diagnostics).await?;

    let mut high_water = since;
    for record in local_records {
        if record.updated_at > since {
            let (sql, params) = sql::upsert(name, &record.row)?;
            ctx.remote.run(&sql, params).await?;
            outcome.synced += 1;
            high_water = high_water.max(record.updated_at);
        }
    }
    ctx.stamps.insert(name.to_string(), high_water);
    Ok(())
}

/// Compares row counts on both sides. Lenient mode logs discrepancies;
/// strict mode fails the cycle.
async fn verify(
    ctx: &CycleContext<'_>,
    tables: &[TableSync],
    result: &mut SyncResult,
) -> Result<()> {
    for table in tables {
        let count_sql = sql::count_rows(&table.name)?;
        let local_n = ctx
            .primary
            .get(&count_sql, Params::none())
            .await?
            .and_then(|r| r.integer("n"))
            .unwrap_or(0);
        let remote_n = ctx
            .remote
            .get(&count_sql, Params::none())
            .await?
            .and_then(|r| r.integer("n"))
            .unwrap_or(0);

        if local_n != remote_n {
            let message = format!(
                "{}: row counts diverge after sync (local {local_n}, remote {remote_n})",
                table.name
            );
            if ctx.policy.strict_verification {
                result.success = false;
                result.errors.push(message);
            } else {
                warn!(table = %table.name, local_n, remote_n, "row counts diverge after sync");
            }
        }
    }
    Ok(())
}
