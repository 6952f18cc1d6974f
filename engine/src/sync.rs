//! Routing of mutations to the remote store or the pending-operation log.
//!
//! # Algorithm
//!
//! Every mutation takes the same branch on connectivity:
//!
//! 1. Offline (or forced offline): append to the pending log, schedule a cache write
//! 2. Online: call the remote store, schedule a cache write on success
//!
//! On reconnect the pending log is replayed in timestamp order. Confirmed
//! entries are dropped, failed ones stay for the next attempt, and a debounced
//! reload from the remote store follows any successful pass.

use crate::{
    error::Result, operation::sort_for_replay, ordering, Clock, ConnectivityMonitor, Error,
    FavoriteEntity, FavoritesView, OfflineCache, OperationId, OperationKind, PendingOperation,
    ProcessingFlag, ProcessingGuard, RemoteError, RemoteResult, RemoteStore, StationId,
    Timestamp,
};
use crate::{debounce::CoalescingScheduler, EngineConfig};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Where a mutation goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Online,
    Offline,
}

/// How a persisted mutation ended up stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Confirmed by the remote store
    Synced,
    /// Recorded in the pending log for later replay
    Queued,
}

/// A change to persist.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Add(FavoriteEntity),
    Update(FavoriteEntity),
    Delete(FavoriteEntity),
    /// Positions of the whole list changed
    Reorder,
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::Add(_) => OperationKind::Add,
            Mutation::Update(_) => OperationKind::Update,
            Mutation::Delete(_) => OperationKind::Delete,
            Mutation::Reorder => OperationKind::Reorder,
        }
    }

    pub fn into_snapshot(self) -> Option<FavoriteEntity> {
        match self {
            Mutation::Add(f) | Mutation::Update(f) | Mutation::Delete(f) => Some(f),
            Mutation::Reorder => None,
        }
    }
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    /// Entries confirmed by the remote store and removed from the log
    pub replayed: Vec<OperationId>,
    /// Entries that failed or were held back; still in the log
    pub failed: Vec<OperationId>,
    /// Malformed entries dropped without a remote call
    pub discarded: Vec<OperationId>,
}

impl ReplayReport {
    /// Entries left in the log after the pass.
    pub fn remaining(&self) -> usize {
        self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replayed.is_empty() && self.failed.is_empty() && self.discarded.is_empty()
    }
}

/// Everything the engine and its background jobs need.
pub struct SyncDeps {
    pub remote: Arc<dyn RemoteStore>,
    pub cache: Arc<OfflineCache>,
    pub view: Arc<dyn FavoritesView>,
    pub processing: Arc<ProcessingFlag>,
    pub clock: Arc<dyn Clock>,
}

struct Shared {
    remote: Arc<dyn RemoteStore>,
    cache: Arc<OfflineCache>,
    view: Arc<dyn FavoritesView>,
    processing: Arc<ProcessingFlag>,
    clock: Arc<dyn Clock>,
    remote_timeout: Duration,
    last_sync: AtomicU64,
}

impl Shared {
    /// Bound a remote call by the configured timeout.
    async fn call<T>(&self, fut: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        match tokio::time::timeout(self.remote_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::timeout(self.remote_timeout)),
        }
    }

    fn user_favorites(&self, user_id: &str) -> Vec<FavoriteEntity> {
        self.view
            .snapshot()
            .into_iter()
            .filter(|f| f.user_id == user_id)
            .collect()
    }

    async fn upsert(&self, favorite: &FavoriteEntity) -> RemoteResult<()> {
        self.call(self.remote.add_or_update_favorite(favorite)).await
    }

    async fn remove(&self, user_id: &str, station_id: &str) -> RemoteResult<()> {
        self.call(self.remote.remove_favorite(user_id, station_id))
            .await
    }

    /// Push the position of every favorite of `user_id` currently in memory.
    ///
    /// A favorite the remote does not know yet is upserted whole.
    async fn push_positions(&self, user_id: &str) -> RemoteResult<()> {
        let favorites = self.user_favorites(user_id);
        let results = join_all(favorites.iter().map(|favorite| async move {
            let pushed = self
                .call(self.remote.update_favorite_position(
                    user_id,
                    &favorite.station_id,
                    favorite.position,
                ))
                .await;
            match pushed {
                Err(e) if e.is_not_found() => self.upsert(favorite).await,
                other => other,
            }
        }))
        .await;
        results.into_iter().collect()
    }

    async fn write_through(&self, user_id: &str, mutation: &Mutation) -> RemoteResult<()> {
        match mutation {
            Mutation::Add(favorite) | Mutation::Update(favorite) => self.upsert(favorite).await,
            Mutation::Delete(favorite) => self.remove(user_id, &favorite.station_id).await,
            Mutation::Reorder => self.push_positions(user_id).await,
        }
    }

    async fn replay_one(&self, user_id: &str, op: &PendingOperation) -> RemoteResult<()> {
        match (op.kind, &op.favorite_snapshot) {
            (OperationKind::Add | OperationKind::Update, Some(favorite)) => {
                self.upsert(favorite).await
            }
            (OperationKind::Delete, Some(favorite)) => {
                self.remove(user_id, &favorite.station_id).await
            }
            (OperationKind::Reorder, _) => self.push_positions(user_id).await,
            (kind, None) => Err(RemoteError::new(format!("{kind} entry has no favorite"))),
        }
    }

    /// Write the in-memory list to the cache. Failures are logged only.
    async fn write_cache(&self, user_id: &str) {
        let favorites = self.user_favorites(user_id);
        if let Err(e) = self.cache.cache_favorites(user_id, &favorites).await {
            tracing::warn!(user_id, error = %e, "failed to cache favorites");
        }
    }

    /// Replace the in-memory list with the remote one, unless local work is
    /// still outstanding or the list changed while the fetch was in flight.
    async fn reload(&self, user_id: &str) {
        let version = self.view.version();
        let remote = match self.call(self.remote.get_favorites(user_id)).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "reload from remote failed");
                return;
            }
        };
        match self.cache.pending_count(user_id).await {
            Ok(0) => {}
            Ok(pending) => {
                tracing::debug!(user_id, pending, "reload skipped, log not empty");
                return;
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "reload skipped, log unreadable");
                return;
            }
        }
        if self.processing.is_processing() {
            tracing::debug!(user_id, "reload skipped, operation in progress");
            return;
        }

        let favorites = ordering::normalize(remote, self.clock.now_millis());
        if !self.view.replace_if_unchanged(version, favorites.clone()) {
            tracing::debug!(user_id, "reload skipped, list changed during fetch");
            return;
        }
        tracing::debug!(user_id, count = favorites.len(), "reloaded favorites from remote");
        if let Err(e) = self.cache.cache_favorites(user_id, &favorites).await {
            tracing::warn!(user_id, error = %e, "failed to cache reloaded favorites");
        }
    }
}

/// Decides between write-through and queueing, and replays the queue.
pub struct SyncEngine {
    shared: Arc<Shared>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    force_offline: AtomicBool,
    cache_writer: CoalescingScheduler,
    reloader: CoalescingScheduler,
}

impl SyncEngine {
    pub fn new(
        deps: SyncDeps,
        connectivity: Arc<dyn ConnectivityMonitor>,
        config: &EngineConfig,
    ) -> Self {
        let SyncDeps {
            remote,
            cache,
            view,
            processing,
            clock,
        } = deps;
        Self {
            shared: Arc::new(Shared {
                remote,
                cache,
                view,
                processing,
                clock,
                remote_timeout: config.remote_timeout(),
                last_sync: AtomicU64::new(0),
            }),
            connectivity,
            force_offline: AtomicBool::new(false),
            cache_writer: CoalescingScheduler::new("cache-writer", config.cache_debounce()),
            reloader: CoalescingScheduler::new("reloader", config.reload_debounce()),
        }
    }

    pub fn cache(&self) -> &OfflineCache {
        &self.shared.cache
    }

    pub fn mode(&self) -> SyncMode {
        if self.is_online() {
            SyncMode::Online
        } else {
            SyncMode::Offline
        }
    }

    /// Connected and not forced offline.
    pub fn is_online(&self) -> bool {
        !self.is_force_offline() && self.connectivity.is_connected()
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity.is_connected()
    }

    /// Receiver of connectivity changes, for reconnect detection.
    pub fn watch_connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity.subscribe()
    }

    pub fn is_force_offline(&self) -> bool {
        self.force_offline.load(Ordering::SeqCst)
    }

    /// Route every mutation to the pending log regardless of connectivity.
    pub fn set_force_offline(&self, forced: bool) {
        let was = self.force_offline.swap(forced, Ordering::SeqCst);
        if was != forced {
            tracing::info!(forced, "force-offline changed");
        }
    }

    /// When the last successful replay finished, if any.
    pub fn last_sync(&self) -> Option<Timestamp> {
        match self.shared.last_sync.load(Ordering::SeqCst) {
            0 => None,
            at => Some(at),
        }
    }

    /// Persist a mutation already applied to the in-memory list.
    pub async fn persist(
        &self,
        user_id: &str,
        mutation: Mutation,
    ) -> std::result::Result<Durability, RemoteError> {
        match self.mode() {
            SyncMode::Offline => {
                self.queue(user_id, mutation).await;
                Ok(Durability::Queued)
            }
            SyncMode::Online => {
                self.shared.write_through(user_id, &mutation).await?;
                tracing::debug!(user_id, kind = %mutation.kind(), "mutation synced");
                self.schedule_cache_write(user_id);
                Ok(Durability::Synced)
            }
        }
    }

    /// Record a mutation in the pending log and schedule a cache write.
    ///
    /// A log write failure is logged and swallowed.
    pub async fn queue(&self, user_id: &str, mutation: Mutation) {
        let kind = mutation.kind();
        if let Err(e) = self
            .shared
            .cache
            .add_to_pending_operations(user_id, kind, mutation.into_snapshot())
            .await
        {
            tracing::warn!(user_id, %kind, error = %e, "failed to enqueue operation");
        }
        self.schedule_cache_write(user_id);
    }

    /// Write the list to the cache once the debounce delay has passed.
    ///
    /// The job reads the list when it fires, so a burst caches its final state.
    pub fn schedule_cache_write(&self, user_id: &str) {
        let shared = self.shared.clone();
        let user_id = user_id.to_string();
        self.cache_writer
            .schedule(async move { shared.write_cache(&user_id).await });
    }

    /// Skip the debounce and write the list to the cache now.
    pub async fn flush_cache(&self, user_id: &str) {
        self.cache_writer.cancel();
        self.shared.write_cache(user_id).await;
    }

    /// Whether a debounced cache write is waiting or running.
    pub fn cache_write_pending(&self) -> bool {
        self.cache_writer.is_pending()
    }

    pub async fn fetch_remote(&self, user_id: &str) -> RemoteResult<Vec<FavoriteEntity>> {
        self.shared
            .call(self.shared.remote.get_favorites(user_id))
            .await
    }

    pub async fn remote_contains(&self, user_id: &str, station_id: &str) -> RemoteResult<bool> {
        self.shared
            .call(self.shared.remote.is_favorite(user_id, station_id))
            .await
    }

    /// Replay the pending log, rejecting the call if an operation is running.
    pub async fn sync_pending_operations(&self, user_id: &str) -> Result<ReplayReport> {
        let guard = self.shared.processing.try_begin().ok_or(Error::Busy)?;
        self.replay(user_id, &guard).await
    }

    /// Replay the pending log while holding the processing flag.
    ///
    /// Entries run in timestamp order. Once an entry for a station fails, later
    /// entries for the same station are held back so they cannot overtake it.
    pub async fn replay(&self, user_id: &str, _guard: &ProcessingGuard) -> Result<ReplayReport> {
        let mut report = ReplayReport::default();
        if !self.is_online() {
            tracing::debug!(user_id, "replay skipped while offline");
            return Ok(report);
        }

        let mut log = match self.shared.cache.get_pending_operations(user_id).await {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "pending log unreadable, replay skipped");
                return Ok(report);
            }
        };
        if log.is_empty() {
            return Ok(report);
        }
        sort_for_replay(&mut log);
        tracing::info!(user_id, pending = log.len(), "replaying pending operations");

        let mut blocked: HashSet<StationId> = HashSet::new();
        for op in &log {
            if !op.is_well_formed() {
                tracing::warn!(user_id, op_id = %op.op_id, kind = %op.kind, "discarding malformed entry");
                report.discarded.push(op.op_id.clone());
                continue;
            }
            if op.station_id().is_some_and(|s| blocked.contains(s)) {
                report.failed.push(op.op_id.clone());
                continue;
            }
            match self.shared.replay_one(user_id, op).await {
                Ok(()) => report.replayed.push(op.op_id.clone()),
                Err(e) => {
                    tracing::warn!(user_id, op_id = %op.op_id, kind = %op.kind, error = %e, "replay failed");
                    if let Some(station) = op.station_id() {
                        blocked.insert(station.to_string());
                    }
                    report.failed.push(op.op_id.clone());
                }
            }
        }

        let settled: Vec<OperationId> = report
            .replayed
            .iter()
            .chain(&report.discarded)
            .cloned()
            .collect();
        if let Err(e) = self
            .shared
            .cache
            .remove_pending_operations(user_id, &settled)
            .await
        {
            tracing::warn!(user_id, error = %e, "failed to prune pending log");
        }

        if !report.replayed.is_empty() {
            self.shared.write_cache(user_id).await;
            self.shared
                .last_sync
                .store(self.shared.clock.now_millis(), Ordering::SeqCst);
            self.schedule_reload(user_id);
        }
        tracing::info!(
            user_id,
            replayed = report.replayed.len(),
            failed = report.failed.len(),
            discarded = report.discarded.len(),
            "replay finished"
        );
        Ok(report)
    }

    /// Reload from the remote store once the debounce delay has passed.
    pub fn schedule_reload(&self, user_id: &str) {
        let shared = self.shared.clone();
        let user_id = user_id.to_string();
        self.reloader
            .schedule(async move { shared.reload(&user_id).await });
    }

    /// Cancel both debounced jobs.
    pub fn dispose(&self) {
        let cache_write = self.cache_writer.cancel();
        let reload = self.reloader.cancel();
        tracing::debug!(cache_write, reload, "sync engine disposed");
    }
}
