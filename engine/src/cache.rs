//! Offline cache: last known favorites and the pending-operation log.
//!
//! The cache only reads and writes durable storage; it never touches the
//! in-memory list. Each user has two records, keyed by the full user id.

use crate::{
    error::Result, Clock, FavoriteEntity, FavoritesSnapshot, KeyValueStore, OperationId,
    OperationKind, PendingLog, PendingOperation, Timestamp,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Favorites read back from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFavorites {
    /// Favorites ordered by position
    pub favorites: Vec<FavoriteEntity>,
    /// When the snapshot was written
    pub last_sync: Timestamp,
}

pub fn favorites_key(user_id: &str) -> String {
    format!("favorites:{user_id}")
}

pub fn pending_key(user_id: &str) -> String {
    format!("pending:{user_id}")
}

/// Durable snapshot and log storage on top of a [`KeyValueStore`].
pub struct OfflineCache {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-write cycles on the pending log.
    log_lock: Mutex<()>,
}

impl OfflineCache {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            clock,
            log_lock: Mutex::new(()),
        }
    }

    /// Persist the full list for `user_id`, stamped with the current time.
    pub async fn cache_favorites(&self, user_id: &str, favorites: &[FavoriteEntity]) -> Result<()> {
        let snapshot = FavoritesSnapshot::new(user_id, favorites, self.clock.now_millis());
        self.kv
            .put(&favorites_key(user_id), snapshot.to_json()?)
            .await?;
        tracing::debug!(user_id, count = favorites.len(), "favorites cached");
        Ok(())
    }

    pub async fn get_cached_favorites(&self, user_id: &str) -> Result<Option<CachedFavorites>> {
        let Some(json) = self.kv.get(&favorites_key(user_id)).await? else {
            return Ok(None);
        };
        let snapshot = FavoritesSnapshot::from_json(&json)?;
        let last_sync = snapshot.timestamp;
        Ok(Some(CachedFavorites {
            favorites: snapshot.into_favorites(),
            last_sync,
        }))
    }

    pub async fn is_cached_favorite(&self, user_id: &str, station_id: &str) -> Result<bool> {
        Ok(self
            .get_cached_favorites(user_id)
            .await?
            .is_some_and(|cached| {
                cached
                    .favorites
                    .iter()
                    .any(|f| f.is_keyed(user_id, station_id))
            }))
    }

    /// Append a new entry describing a mutation and return it.
    pub async fn add_to_pending_operations(
        &self,
        user_id: &str,
        kind: OperationKind,
        snapshot: Option<FavoriteEntity>,
    ) -> Result<PendingOperation> {
        let op = PendingOperation::new(kind, snapshot, self.clock.now_millis());
        self.push_pending(user_id, op).await
    }

    /// Append an already built entry and return it as stored.
    ///
    /// Timestamps in the log are strictly increasing, so two mutations made
    /// within the same millisecond still replay in the order they happened.
    pub async fn push_pending(
        &self,
        user_id: &str,
        mut op: PendingOperation,
    ) -> Result<PendingOperation> {
        let _guard = self.log_lock.lock().await;
        let mut log = self.read_log(user_id).await?;
        if let Some(last) = log.operations.iter().map(|o| o.timestamp).max() {
            op.timestamp = op.timestamp.max(last + 1);
        }
        tracing::debug!(user_id, kind = %op.kind, station = ?op.station_id(), "operation enqueued");
        log.operations.push(op.clone());
        self.write_log(user_id, &log).await?;
        Ok(op)
    }

    /// Entries in storage order.
    pub async fn get_pending_operations(&self, user_id: &str) -> Result<Vec<PendingOperation>> {
        let _guard = self.log_lock.lock().await;
        Ok(self.read_log(user_id).await?.operations)
    }

    /// Kind of the latest pending entry for `station_id`, in replay order.
    pub async fn last_pending_kind(
        &self,
        user_id: &str,
        station_id: &str,
    ) -> Result<Option<OperationKind>> {
        let log = self.get_pending_operations(user_id).await?;
        Ok(log
            .iter()
            .filter(|op| op.station_id() == Some(station_id))
            .max_by(|a, b| a.replay_cmp(b))
            .map(|op| op.kind))
    }

    pub async fn pending_count(&self, user_id: &str) -> Result<usize> {
        Ok(self.get_pending_operations(user_id).await?.len())
    }

    /// Drop the given entries. Returns how many were removed.
    pub async fn remove_pending_operations(
        &self,
        user_id: &str,
        op_ids: &[OperationId],
    ) -> Result<usize> {
        if op_ids.is_empty() {
            return Ok(0);
        }
        let _guard = self.log_lock.lock().await;
        let mut log = self.read_log(user_id).await?;
        let doomed: HashSet<&str> = op_ids.iter().map(String::as_str).collect();

        // Walk backwards so removals do not shift indices still to visit.
        let mut removed = 0;
        for index in (0..log.operations.len()).rev() {
            if doomed.contains(log.operations[index].op_id.as_str()) {
                log.operations.remove(index);
                removed += 1;
            }
        }

        if removed > 0 {
            self.write_log(user_id, &log).await?;
        }
        Ok(removed)
    }

    /// Forget everything stored for `user_id`.
    pub async fn clear(&self, user_id: &str) -> Result<()> {
        let _guard = self.log_lock.lock().await;
        self.kv.remove(&favorites_key(user_id)).await?;
        self.kv.remove(&pending_key(user_id)).await?;
        Ok(())
    }

    async fn read_log(&self, user_id: &str) -> Result<PendingLog> {
        match self.kv.get(&pending_key(user_id)).await? {
            Some(json) => PendingLog::from_json(&json),
            None => Ok(PendingLog::default()),
        }
    }

    async fn write_log(&self, user_id: &str, log: &PendingLog) -> Result<()> {
        if log.operations.is_empty() {
            self.kv.remove(&pending_key(user_id)).await?;
            return Ok(());
        }
        self.kv.put(&pending_key(user_id), log.to_json()?).await?;
        Ok(())
    }
}
