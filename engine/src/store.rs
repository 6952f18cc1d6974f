//! The favorites store: the public surface of the engine.
//!
//! Every mutating operation follows the same shape:
//!
//! 1. Claim the processing flag (rejecting with [`Error::Busy`] if taken)
//! 2. Apply the change to the in-memory list and notify observers
//! 3. Persist through the [`SyncEngine`], online or queued
//! 4. Roll back or keep the local change depending on the kind of mutation
//!
//! Adds and deletes change membership and are rolled back when the remote
//! rejects them. Content edits and reorders keep the local change and are
//! queued for the next replay.

use crate::{
    connectivity::ReconnectWatch,
    entity::{is_meaningful_name, normalize_source_name},
    error::Result,
    ordering, Clock, ConnectivityMonitor, Durability, EngineConfig, Error, FavoriteEntity,
    FavoritesList, FavoritesView, GeoLocation, KeyValueStore, Mutation, NameResolutionService,
    OfflineCache, OperationKind, ProcessingFlag, ProcessingGuard, RemoteStore, ReplayReport, StationId,
    SyncDeps, SyncEngine, Timestamp, UserId,
};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How often a reconnect retries a replay that found the store busy.
const RECONNECT_ATTEMPTS: u32 = 3;
const RECONNECT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Services the store is built from.
pub struct Collaborators {
    pub remote: Arc<dyn RemoteStore>,
    pub connectivity: Arc<dyn ConnectivityMonitor>,
    pub storage: Arc<dyn KeyValueStore>,
    pub names: Arc<dyn NameResolutionService>,
    pub clock: Arc<dyn Clock>,
}

/// Request to add a favorite.
///
/// Missing names are resolved through the name service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewFavorite {
    pub user_id: UserId,
    pub station_id: StationId,
    pub display_name: Option<String>,
    pub original_source_name: Option<String>,
    pub description: Option<String>,
    pub geo: GeoLocation,
}

impl NewFavorite {
    pub fn new(user_id: impl Into<UserId>, station_id: impl Into<StationId>) -> Self {
        Self {
            user_id: user_id.into(),
            station_id: station_id.into(),
            ..Self::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_original_source_name(mut self, name: impl Into<String>) -> Self {
        self.original_source_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_geo(mut self, geo: GeoLocation) -> Self {
        self.geo = geo;
        self
    }
}

#[derive(Debug, Clone)]
struct DeletedFavorite {
    favorite: FavoriteEntity,
    deleted_at: Timestamp,
}

/// Offline-first favorites of the signed-in user.
pub struct FavoritesStore {
    list: Arc<FavoritesList>,
    sync: SyncEngine,
    names: Arc<dyn NameResolutionService>,
    processing: Arc<ProcessingFlag>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    recently_deleted: Mutex<HashMap<StationId, DeletedFavorite>>,
    last_error: Mutex<Option<String>>,
    current_user: RwLock<Option<UserId>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

impl FavoritesStore {
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        let Collaborators {
            remote,
            connectivity,
            storage,
            names,
            clock,
        } = collaborators;

        let list = Arc::new(FavoritesList::new());
        let processing = ProcessingFlag::new();
        let cache = Arc::new(OfflineCache::new(storage, clock.clone()));
        let sync = SyncEngine::new(
            SyncDeps {
                remote,
                cache,
                view: list.clone(),
                processing: processing.clone(),
                clock: clock.clone(),
            },
            connectivity,
            &config,
        );

        Self {
            list,
            sync,
            names,
            processing,
            clock,
            config,
            recently_deleted: Mutex::new(HashMap::new()),
            last_error: Mutex::new(None),
            current_user: RwLock::new(None),
            reconnect_task: Mutex::new(None),
        }
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn favorites(&self) -> Vec<FavoriteEntity> {
        self.list.snapshot()
    }

    /// Receiver that sees the list after every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<FavoriteEntity>> {
        self.list.subscribe()
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.current_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_error(&self) {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_processing(&self) -> bool {
        self.processing.is_processing()
    }

    pub fn is_online(&self) -> bool {
        self.sync.is_online()
    }

    pub fn last_sync(&self) -> Option<Timestamp> {
        self.sync.last_sync()
    }

    pub async fn pending_count(&self, user_id: &str) -> Result<usize> {
        self.sync.cache().pending_count(user_id).await
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add a favorite at the end of the list.
    ///
    /// Adding a station that is already a favorite succeeds without change.
    pub async fn add_favorite(&self, request: NewFavorite) -> Result<()> {
        let _guard = self.begin()?;
        let result = self.add_locked(request).await;
        self.settle("add_favorite", result)
    }

    pub async fn rename_favorite(
        &self,
        user_id: &str,
        station_id: &str,
        new_name: &str,
    ) -> Result<()> {
        let _guard = self.begin()?;
        let result = self.rename_locked(user_id, station_id, new_name).await;
        self.settle("rename_favorite", result)
    }

    pub async fn update_image(
        &self,
        user_id: &str,
        station_id: &str,
        image_index: u32,
    ) -> Result<()> {
        let _guard = self.begin()?;
        let result = self
            .update_with(user_id, station_id, |f, now| f.with_image(image_index, now))
            .await;
        self.settle("update_image", result)
    }

    /// Set or clear the custom image. An empty path clears it.
    pub async fn update_custom_image(
        &self,
        user_id: &str,
        station_id: &str,
        path: Option<String>,
    ) -> Result<()> {
        let _guard = self.begin()?;
        let result = self
            .update_with(user_id, station_id, |f, now| f.with_custom_image(path, now))
            .await;
        self.settle("update_custom_image", result)
    }

    pub async fn update_description(
        &self,
        user_id: &str,
        station_id: &str,
        description: Option<String>,
    ) -> Result<()> {
        let _guard = self.begin()?;
        let result = self
            .update_with(user_id, station_id, |f, now| f.described(description, now))
            .await;
        self.settle("update_description", result)
    }

    /// Remove a favorite. It can be restored with [`undo_delete`](Self::undo_delete)
    /// until the retention window closes.
    pub async fn delete_favorite(&self, user_id: &str, station_id: &str) -> Result<()> {
        let _guard = self.begin()?;
        let result = self.delete_locked(user_id, station_id).await;
        self.settle("delete_favorite", result)
    }

    /// Restore a recently deleted favorite at the end of the list.
    pub async fn undo_delete(&self, station_id: &str) -> Result<()> {
        let _guard = self.begin()?;
        let result = self.undo_locked(station_id).await;
        self.settle("undo_delete", result)
    }

    /// Move the favorite at `old_index` to `new_index`. Both must be in `[0, len)`.
    pub async fn reorder(&self, old_index: usize, new_index: usize) -> Result<()> {
        let _guard = self.begin()?;
        let result = self.reorder_locked(old_index, new_index).await;
        self.settle("reorder", result)
    }

    // ========================================================================
    // Queries and sync
    // ========================================================================

    /// Whether `station_id` is a favorite, checking memory first.
    pub async fn check_is_favorite(&self, user_id: &str, station_id: &str) -> bool {
        if self.list.contains(user_id, station_id) {
            return true;
        }
        if self.sync.is_online() {
            match self.sync.remote_contains(user_id, station_id).await {
                Ok(found) => return found,
                Err(e) => {
                    tracing::warn!(user_id, station_id, error = %e, "remote check failed, using cache");
                }
            }
        }
        self.cached_contains(user_id, station_id).await
    }

    /// Load the list of `user_id` into memory and return it.
    ///
    /// Online with nothing pending the remote list wins. Otherwise the cached
    /// list is shown and, when online, the pending log is replayed.
    pub async fn load_favorites(&self, user_id: &str) -> Result<Vec<FavoriteEntity>> {
        let guard = self.begin()?;
        let result = self.load_locked(user_id, &guard).await;
        self.settle("load_favorites", result)
    }

    /// Replay the pending log of the current user.
    pub async fn sync_pending_operations(&self) -> Result<ReplayReport> {
        let Some(user_id) = self.current_user() else {
            return Ok(ReplayReport::default());
        };
        self.sync.sync_pending_operations(&user_id).await
    }

    /// Route all mutations to the pending log until turned off again.
    ///
    /// Turning it off while connected replays the log.
    pub async fn set_force_offline(&self, forced: bool) {
        self.sync.set_force_offline(forced);
        if !forced && self.sync.is_online() {
            match self.sync_pending_operations().await {
                Ok(report) => tracing::debug!(replayed = report.replayed.len(), "replayed after force-offline"),
                Err(e) => tracing::debug!(error = %e, "replay after force-offline skipped"),
            }
        }
    }

    pub fn is_force_offline(&self) -> bool {
        self.sync.is_force_offline()
    }

    /// Replay the pending log on every reconnect until the store is dropped
    /// or disposed.
    pub fn spawn_reconnect_listener(self: &Arc<Self>) {
        let mut reconnects = ReconnectWatch::new(self.sync.watch_connectivity());
        let store = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while reconnects.next_reconnect().await {
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.on_reconnect().await;
            }
            tracing::debug!("reconnect listener stopped");
        });

        let previous = self
            .reconnect_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Write the in-memory list to the cache now, skipping the debounce.
    pub async fn flush_cache(&self) {
        if let Some(user_id) = self.current_user() {
            self.sync.flush_cache(&user_id).await;
        }
    }

    /// Stop background work: the reconnect listener and both debounced jobs.
    pub fn dispose(&self) {
        if let Some(task) = self
            .reconnect_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.sync.dispose();
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn begin(&self) -> Result<ProcessingGuard> {
        self.processing.try_begin().ok_or_else(|| {
            tracing::debug!("operation rejected, another one is in progress");
            Error::Busy
        })
    }

    /// Record a failure as the user-visible error and pass the result on.
    fn settle<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.record_error(operation, e);
        }
        result
    }

    fn record_error(&self, operation: &'static str, error: &Error) {
        if !error.is_reportable() {
            return;
        }
        tracing::warn!(operation, %error, "favorites operation failed");
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error.to_string());
    }

    /// Make `user_id` the signed-in user.
    ///
    /// The list only ever holds the current user's favorites. On a switch the
    /// previous user's list is flushed to the cache, the undo stash is dropped
    /// and the new user's cached favorites take its place.
    async fn switch_user(&self, user_id: &str) {
        let previous = {
            let mut current = self
                .current_user
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if current.as_deref() == Some(user_id) {
                return;
            }
            current.replace(user_id.to_string())
        };
        let Some(previous) = previous else {
            return;
        };

        self.recently_deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.sync.flush_cache(&previous).await;

        let cached = match self.sync.cache().get_cached_favorites(user_id).await {
            Ok(cached) => cached.map(|c| c.favorites).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "cached favorites unreadable");
                Vec::new()
            }
        };
        let favorites = ordering::normalize(cached, self.clock.now_millis());
        tracing::info!(from = %previous, to = user_id, count = favorites.len(), "switched user");
        self.list.replace_all(favorites);
    }

    async fn cached_contains(&self, user_id: &str, station_id: &str) -> bool {
        match self.sync.cache().is_cached_favorite(user_id, station_id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(user_id, station_id, error = %e, "cache check failed");
                false
            }
        }
    }

    /// Membership outside the in-memory list: the cache when offline, the
    /// remote store when online. A queued delete overrides both.
    async fn stored_elsewhere(&self, user_id: &str, station_id: &str) -> bool {
        match self.sync.cache().last_pending_kind(user_id, station_id).await {
            Ok(Some(OperationKind::Delete)) => return false,
            Ok(_) => {}
            Err(e) => tracing::warn!(user_id, station_id, error = %e, "pending log unreadable"),
        }
        if !self.sync.is_online() {
            return self.cached_contains(user_id, station_id).await;
        }
        match self.sync.remote_contains(user_id, station_id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(user_id, station_id, error = %e, "remote membership check failed");
                false
            }
        }
    }

    async fn add_locked(&self, request: NewFavorite) -> Result<()> {
        let NewFavorite {
            user_id,
            station_id,
            display_name,
            original_source_name,
            description,
            geo,
        } = request;
        self.switch_user(&user_id).await;

        if self.list.contains(&user_id, &station_id) {
            tracing::debug!(user_id, station_id, "already a favorite");
            return Ok(());
        }
        if self.stored_elsewhere(&user_id, &station_id).await {
            tracing::debug!(user_id, station_id, "already stored, not duplicating");
            if self.sync.is_online() {
                self.sync.schedule_reload(&user_id);
            }
            return Ok(());
        }

        let info = self.names.get_name_info(&station_id).await;
        let display_name = match display_name.filter(|n| is_meaningful_name(n)) {
            Some(name) => name,
            None => self
                .names
                .get_display_name(&station_id)
                .await
                .filter(|n| is_meaningful_name(n))
                .unwrap_or_else(|| self.config.fallback_display_name.clone()),
        };
        let source_name = normalize_source_name(original_source_name)
            .or_else(|| info.and_then(|i| normalize_source_name(i.original_source_name)))
            .unwrap_or_else(|| display_name.clone());
        let image_index = rand::thread_rng().gen_range(0..self.config.image_count.max(1));

        let position = self.list.count_for(&user_id) as u32;
        let favorite = FavoriteEntity::new(
            user_id.clone(),
            station_id.clone(),
            display_name.clone(),
            position,
            self.clock.now_millis(),
        )
        .with_original_source_name(Some(source_name))
        .with_description(description)
        .with_geo(geo)
        .with_image_index(image_index);

        self.insert_new(&user_id, favorite.clone()).await?;

        self.names
            .update_display_name(&station_id, &display_name)
            .await;
        if let Some(source) = &favorite.original_source_name {
            self.names.set_original_source_name(&station_id, source).await;
        }
        tracing::info!(user_id, station_id, position, "favorite added");
        Ok(())
    }

    /// Append a new favorite. Offline it shows immediately; online it only
    /// shows once the remote store accepted it.
    async fn insert_new(&self, user_id: &str, favorite: FavoriteEntity) -> Result<Durability> {
        if !self.sync.is_online() {
            self.list.insert_sorted(favorite.clone());
            return Ok(self.sync.persist(user_id, Mutation::Add(favorite)).await?);
        }
        let durability = self
            .sync
            .persist(user_id, Mutation::Add(favorite.clone()))
            .await?;
        self.list.insert_sorted(favorite);
        Ok(durability)
    }

    async fn rename_locked(&self, user_id: &str, station_id: &str, new_name: &str) -> Result<()> {
        self.switch_user(user_id).await;
        let current = self.find(user_id, station_id)?;

        let source_name = self
            .names
            .get_name_info(station_id)
            .await
            .and_then(|info| normalize_source_name(info.original_source_name))
            .unwrap_or_else(|| current.display_name.clone());
        let updated = current
            .backfilled(Some(source_name))
            .renamed(new_name, self.clock.now_millis());

        self.names.update_display_name(station_id, new_name).await;
        if let Some(source) = &updated.original_source_name {
            self.names.set_original_source_name(station_id, source).await;
        }
        self.apply_update(user_id, updated).await
    }

    async fn update_with(
        &self,
        user_id: &str,
        station_id: &str,
        change: impl FnOnce(FavoriteEntity, Timestamp) -> FavoriteEntity,
    ) -> Result<()> {
        self.switch_user(user_id).await;
        let current = self.find(user_id, station_id)?;
        let updated = change(current, self.clock.now_millis());
        self.apply_update(user_id, updated).await
    }

    /// Show an edit immediately and persist it. A rejected edit stays local
    /// and is queued for the next replay.
    async fn apply_update(&self, user_id: &str, updated: FavoriteEntity) -> Result<()> {
        let station_id = updated.station_id.clone();
        self.list.replace(updated.clone());
        match self
            .sync
            .persist(user_id, Mutation::Update(updated.clone()))
            .await
        {
            Ok(_) => {
                tracing::debug!(user_id, station_id, "favorite updated");
                Ok(())
            }
            Err(e) => {
                self.sync.queue(user_id, Mutation::Update(updated)).await;
                Err(e.into())
            }
        }
    }

    async fn delete_locked(&self, user_id: &str, station_id: &str) -> Result<()> {
        self.switch_user(user_id).await;
        let now = self.clock.now_millis();
        let (index, removed, shifted) = self
            .list
            .remove(user_id, station_id, now)
            .ok_or_else(|| Error::NotFound(station_id.to_string()))?;
        self.stash_deleted(removed.clone(), now);

        if let Err(e) = self
            .sync
            .persist(user_id, Mutation::Delete(removed.clone()))
            .await
        {
            self.list.reinsert(index, removed, now);
            self.recently_deleted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(station_id);
            return Err(e.into());
        }

        if shifted {
            if let Err(e) = self.sync.persist(user_id, Mutation::Reorder).await {
                tracing::warn!(user_id, error = %e, "positions after delete not synced, queued");
                self.sync.queue(user_id, Mutation::Reorder).await;
            }
        }
        tracing::info!(user_id, station_id, "favorite deleted");
        Ok(())
    }

    fn stash_deleted(&self, favorite: FavoriteEntity, now: Timestamp) {
        let retention = self.config.undo_retention_ms;
        let mut stash = self
            .recently_deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        stash.retain(|_, d| now.saturating_sub(d.deleted_at) <= retention);
        stash.insert(
            favorite.station_id.clone(),
            DeletedFavorite {
                favorite,
                deleted_at: now,
            },
        );
    }

    async fn undo_locked(&self, station_id: &str) -> Result<()> {
        let not_found = || Error::NotFound(station_id.to_string());
        let deleted = self
            .recently_deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(station_id)
            .ok_or_else(not_found)?;

        let now = self.clock.now_millis();
        if now.saturating_sub(deleted.deleted_at) > self.config.undo_retention_ms {
            tracing::debug!(station_id, "undo window closed");
            return Err(not_found());
        }

        let user_id = deleted.favorite.user_id.clone();
        if self.list.contains(&user_id, station_id) {
            return Ok(());
        }
        let position = self.list.count_for(&user_id) as u32;
        let restored = deleted
            .favorite
            .clone()
            .at_position(position, now)
            .touched(now);

        if let Err(e) = self.insert_new(&user_id, restored).await {
            self.recently_deleted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(station_id.to_string(), deleted);
            return Err(e);
        }
        tracing::info!(user_id, station_id, position, "favorite restored");
        Ok(())
    }

    async fn reorder_locked(&self, old_index: usize, new_index: usize) -> Result<()> {
        let owner = self
            .list
            .read(|items| items.get(old_index).map(|f| f.user_id.clone()));
        if !self
            .list
            .reorder(old_index, new_index, self.clock.now_millis())?
        {
            return Ok(());
        }
        let Some(user_id) = owner else {
            return Ok(());
        };
        self.switch_user(&user_id).await;

        if let Err(e) = self.sync.persist(&user_id, Mutation::Reorder).await {
            self.sync.queue(&user_id, Mutation::Reorder).await;
            return Err(e.into());
        }
        tracing::debug!(user_id, old_index, new_index, "favorites reordered");
        Ok(())
    }

    async fn load_locked(
        &self,
        user_id: &str,
        guard: &ProcessingGuard,
    ) -> Result<Vec<FavoriteEntity>> {
        self.switch_user(user_id).await;
        let pending = match self.sync.cache().pending_count(user_id).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "pending log unreadable");
                0
            }
        };

        if self.sync.is_online() && pending == 0 {
            match self.sync.fetch_remote(user_id).await {
                Ok(remote) => {
                    let favorites = ordering::normalize(remote, self.clock.now_millis());
                    self.list.replace_all(favorites.clone());
                    self.sync.flush_cache(user_id).await;
                    tracing::info!(user_id, count = favorites.len(), "favorites loaded from remote");
                    return Ok(favorites);
                }
                Err(e) => self.record_error("load_favorites", &e.into()),
            }
        }

        let cached = match self.sync.cache().get_cached_favorites(user_id).await {
            Ok(cached) => cached.map(|c| c.favorites).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "cached favorites unreadable");
                Vec::new()
            }
        };
        let favorites = ordering::normalize(cached, self.clock.now_millis());
        self.list.replace_all(favorites);
        tracing::info!(user_id, pending, "favorites loaded from cache");

        if self.sync.is_online() && pending > 0 {
            self.sync.replay(user_id, guard).await?;
        }
        Ok(self.list.for_user(user_id))
    }

    async fn on_reconnect(&self) {
        for attempt in 1..=RECONNECT_ATTEMPTS {
            match self.sync_pending_operations().await {
                Ok(report) => {
                    tracing::info!(replayed = report.replayed.len(), remaining = report.remaining(), "reconnect replay done");
                    return;
                }
                Err(Error::Busy) => {
                    tracing::debug!(attempt, "store busy on reconnect, retrying");
                    tokio::time::sleep(RECONNECT_RETRY_DELAY).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "reconnect replay failed");
                    return;
                }
            }
        }
    }

    fn find(&self, user_id: &str, station_id: &str) -> Result<FavoriteEntity> {
        self.list
            .find(user_id, station_id)
            .ok_or_else(|| Error::NotFound(station_id.to_string()))
    }
}

impl Drop for FavoritesStore {
    fn drop(&mut self) {
        if let Some(task) = self
            .reconnect_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}
