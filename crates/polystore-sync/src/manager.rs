//! The sync manager.
//!
//! A single cooperative task owns all replication state. Callers talk to it
//! through a command channel (`Sync`, `Mutation`, `Start`, `Stop`, `Close`),
//! and one select loop dispatches commands, the periodic interval, the
//! armed debounce timer, and the connectivity probe. At most one cycle runs
//! at a time; bursts of mutation events coalesce into one follow-up cycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use polystore_common::{Result, StorageError};
use polystore_core::{
    AdapterContext, AdapterKind, AdapterState, BatchOp, BatchResult, Capabilities, Params, Row,
    RunResult, StorageAdapter,
};

use crate::config::{SyncMode, SyncPolicy};
use crate::cycle::{self, CycleContext};
use crate::hooks::SyncHooks;
use crate::result::SyncResult;

enum Command {
    Sync { reply: oneshot::Sender<SyncResult> },
    Mutation,
    Start,
    Stop,
    Close,
}

/// Shared observable state.
struct Status {
    syncing: AtomicBool,
    online: AtomicBool,
    /// Unix millis of the last completed cycle; 0 = never.
    last_sync_ms: AtomicI64,
    /// Aborts an in-flight cycle at the next table boundary.
    cancel: AtomicBool,
}

/// Wrapper handed out by [`SyncManager::db`]: forwards everything to the
/// primary adapter and reports successful mutations to the manager task.
pub struct TrackedAdapter {
    inner: Arc<dyn StorageAdapter>,
    events: mpsc::UnboundedSender<Command>,
}

impl TrackedAdapter {
    fn notify(&self) {
        // The manager may already be closed; mutation events are advisory.
        let _ = self.events.send(Command::Mutation);
    }
}

#[async_trait]
impl StorageAdapter for TrackedAdapter {
    fn kind(&self) -> AdapterKind {
        self.inner.kind()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn state(&self) -> AdapterState {
        self.inner.state()
    }

    fn context(&self) -> AdapterContext {
        self.inner.context()
    }

    async fn open(&self) -> Result<()> {
        self.inner.open().await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    async fn run(&self, sql: &str, params: Params) -> Result<RunResult> {
        let result = self.inner.run(sql, params).await?;
        self.notify();
        Ok(result)
    }

    async fn get(&self, sql: &str, params: Params) -> Result<Option<Row>> {
        self.inner.get(sql, params).await
    }

    async fn all(&self, sql: &str, params: Params) -> Result<Vec<Row>> {
        self.inner.all(sql, params).await
    }

    async fn exec(&self, script: &str) -> Result<()> {
        self.inner.exec(script).await?;
        self.notify();
        Ok(())
    }

    async fn begin(&self) -> Result<()> {
        self.inner.begin().await
    }

    async fn commit(&self) -> Result<()> {
        self.inner.commit().await?;
        self.notify();
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.inner.rollback().await
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<BatchResult> {
        let result = self.inner.batch(ops).await?;
        self.notify();
        Ok(result)
    }
}

struct Worker {
    primary: Arc<dyn StorageAdapter>,
    remote: Option<Arc<dyn StorageAdapter>>,
    policy: SyncPolicy,
    hooks: SyncHooks,
    status: Arc<Status>,
    stamps: HashMap<String, i64>,
    scheduling: bool,
    mutated: bool,
    debounce_deadline: Option<tokio::time::Instant>,
}

enum Flow {
    Continue,
    Shutdown,
}

impl Worker {
    async fn probe(&self) -> bool {
        match &self.remote {
            Some(remote) => remote.get("SELECT 1", Params::none()).await.is_ok(),
            None => false,
        }
    }

    /// Records a connectivity observation; returns true when the remote
    /// just came back.
    fn note_connectivity(&self, online: bool) -> bool {
        let was = self.status.online.swap(online, Ordering::SeqCst);
        if was != online {
            if online {
                info!("remote reachable again");
                self.hooks.emit_online();
            } else {
                info!("remote unreachable");
                self.hooks.emit_offline();
            }
        }
        online && !was
    }

    async fn cycle(&mut self) -> SyncResult {
        let Some(remote) = self.remote.clone() else {
            return SyncResult::no_remote();
        };

        // Probe before every cycle; offline skips it entirely.
        let online = self.probe().await;
        self.note_connectivity(online);
        if !online {
            return SyncResult::offline();
        }

        self.status.syncing.store(true, Ordering::SeqCst);
        let result = cycle::run(CycleContext {
            primary: self.primary.as_ref(),
            remote: remote.as_ref(),
            policy: &self.policy,
            hooks: &self.hooks,
            stamps: &mut self.stamps,
            cancel: &self.status.cancel,
        })
        .await;
        self.status.syncing.store(false, Ordering::SeqCst);
        self.status
            .last_sync_ms
            .store(result.timestamp.timestamp_millis(), Ordering::SeqCst);

        debug!(
            success = result.success,
            records = result.records_synced,
            conflicts = result.conflicts.len(),
            "cycle finished"
        );
        self.hooks.emit_sync(&result);
        result
    }

    async fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::Close => return Flow::Shutdown,
            Command::Sync { reply } => {
                let result = self.cycle().await;
                let _ = reply.send(result);
            }
            Command::Mutation => {
                if self.scheduling {
                    self.mutated = true;
                }
            }
            Command::Start => self.scheduling = true,
            Command::Stop => {
                self.scheduling = false;
                self.debounce_deadline = None;
            }
        }
        Flow::Continue
    }

    /// Reacts to coalesced mutation events per the configured mode.
    async fn after_mutations(&mut self) {
        if !self.mutated {
            return;
        }
        self.mutated = false;
        match self.policy.mode {
            SyncMode::Auto => {
                self.debounce_deadline =
                    Some(tokio::time::Instant::now() + self.policy.debounce());
            }
            SyncMode::Realtime => {
                self.cycle().await;
            }
            _ => {}
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let mut periodic = tokio::time::interval(self.policy.interval());
        periodic.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut probe_ticks = tokio::time::interval(self.policy.probe_interval());
        probe_ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Idle fallback keeps the disabled-timer select arms total.
        let far_future =
            || tokio::time::Instant::now() + Duration::from_secs(24 * 60 * 60);

        loop {
            let debounce_armed = self.debounce_deadline.is_some();
            let debounce_at = self.debounce_deadline.unwrap_or_else(far_future);

            tokio::select! {
                maybe_command = rx.recv() => {
                    let Some(command) = maybe_command else { break };
                    if matches!(self.handle(command).await, Flow::Shutdown) {
                        break;
                    }
                    // Drain queued commands so mutation bursts coalesce
                    // into one follow-up reaction.
                    let mut shutdown = false;
                    while let Ok(next) = rx.try_recv() {
                        if matches!(self.handle(next).await, Flow::Shutdown) {
                            shutdown = true;
                            break;
                        }
                    }
                    if shutdown {
                        break;
                    }
                    self.after_mutations().await;
                }
                _ = periodic.tick(),
                    if self.scheduling && self.policy.mode == SyncMode::Periodic =>
                {
                    self.cycle().await;
                }
                _ = tokio::time::sleep_until(debounce_at), if debounce_armed => {
                    self.debounce_deadline = None;
                    self.cycle().await;
                }
                _ = probe_ticks.tick(),
                    if self.scheduling
                        && self.policy.mode == SyncMode::OnReconnect
                        && self.remote.is_some() =>
                {
                    let online = self.probe().await;
                    if self.note_connectivity(online) {
                        // Restoration triggers a cycle.
                        self.cycle().await;
                    }
                }
            }
        }
        info!("sync manager task stopped");
    }
}

/// Coordinates replication between a primary and a remote adapter.
pub struct SyncManager {
    db: Arc<TrackedAdapter>,
    commands: mpsc::UnboundedSender<Command>,
    status: Arc<Status>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl SyncManager {
    /// Spawns the manager task. Scheduling is active immediately unless the
    /// mode is `Manual`; `start()`/`stop()` toggle it afterwards.
    pub fn new(
        primary: Arc<dyn StorageAdapter>,
        remote: Option<Arc<dyn StorageAdapter>>,
        policy: SyncPolicy,
        hooks: SyncHooks,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let status = Arc::new(Status {
            syncing: AtomicBool::new(false),
            online: AtomicBool::new(true),
            last_sync_ms: AtomicI64::new(0),
            cancel: AtomicBool::new(false),
        });

        let db = Arc::new(TrackedAdapter {
            inner: Arc::clone(&primary),
            events: tx.clone(),
        });

        let worker = Worker {
            primary,
            remote,
            scheduling: policy.mode != SyncMode::Manual,
            policy,
            hooks,
            status: Arc::clone(&status),
            stamps: HashMap::new(),
            mutated: false,
            debounce_deadline: None,
        };
        let task = tokio::spawn(worker.run(rx));

        Self {
            db,
            commands: tx,
            status,
            task: parking_lot::Mutex::new(Some(task)),
        }
    }

    /// The primary adapter, wrapped so mutations feed the sync schedule.
    pub fn db(&self) -> Arc<dyn StorageAdapter> {
        Arc::clone(&self.db) as Arc<dyn StorageAdapter>
    }

    /// Runs one cycle and returns its result.
    pub async fn sync(&self) -> Result<SyncResult> {
        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(Command::Sync { reply })
            .map_err(|_| StorageError::Internal("sync manager is closed".to_string()))?;
        receiver
            .await
            .map_err(|_| StorageError::Internal("sync manager terminated".to_string()))
    }

    /// Enables scheduled syncing.
    pub fn start(&self) {
        let _ = self.commands.send(Command::Start);
    }

    /// Disables scheduled syncing and disarms timers.
    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }

    /// Terminates the task. An in-flight cycle aborts at the next table
    /// boundary; partial progress within a table is kept.
    pub async fn close(&self) {
        self.status.cancel.store(true, Ordering::SeqCst);
        let _ = self.commands.send(Command::Close);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub fn syncing(&self) -> bool {
        self.status.syncing.load(Ordering::SeqCst)
    }

    pub fn online(&self) -> bool {
        self.status.online.load(Ordering::SeqCst)
    }

    /// Completion instant of the last cycle, if any ran.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        match self.status.last_sync_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        // Without an await point the best effort is to stop the task.
        self.status.cancel.store(true, Ordering::SeqCst);
        let _ = self.commands.send(Command::Close);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}
