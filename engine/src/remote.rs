//! The remote store seam and an in-memory implementation.

use crate::{FavoriteEntity, RemoteError, StationId, UserId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Durable backend CRUD for favorites.
///
/// `add_or_update_favorite` must be an idempotent upsert: replaying the same
/// entity twice leaves exactly one record for its key.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn add_or_update_favorite(&self, favorite: &FavoriteEntity) -> RemoteResult<()>;

    async fn remove_favorite(&self, user_id: &str, station_id: &str) -> RemoteResult<()>;

    async fn update_favorite_position(
        &self,
        user_id: &str,
        station_id: &str,
        position: u32,
    ) -> RemoteResult<()>;

    async fn get_favorites(&self, user_id: &str) -> RemoteResult<Vec<FavoriteEntity>>;

    async fn is_favorite(&self, user_id: &str, station_id: &str) -> RemoteResult<bool>;
}

/// A call observed by [`MemoryRemoteStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Upsert {
        station_id: StationId,
        display_name: String,
    },
    Remove {
        station_id: StationId,
    },
    Position {
        station_id: StationId,
        position: u32,
    },
    List {
        user_id: UserId,
    },
    Contains {
        station_id: StationId,
    },
}

/// Remote store backed by a concurrent map.
///
/// Upserts are last-writer-wins on `last_updated_millis`; an equal timestamp
/// replaces the stored record. Failures and latency can be injected.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    favorites: DashMap<(UserId, StationId), FavoriteEntity>,
    failing: AtomicBool,
    fail_next: AtomicUsize,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<RemoteCall>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail until turned off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make the next `count` calls fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Stored records of `user_id`, ordered by position.
    pub fn records(&self, user_id: &str) -> Vec<FavoriteEntity> {
        let mut records: Vec<FavoriteEntity> = self
            .favorites
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.station_id.cmp(&b.station_id))
        });
        records
    }

    pub fn record(&self, user_id: &str, station_id: &str) -> Option<FavoriteEntity> {
        self.favorites
            .get(&(user_id.to_string(), station_id.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Insert directly, bypassing call logging and failure injection.
    pub fn seed(&self, favorite: FavoriteEntity) {
        self.favorites.insert(
            (favorite.user_id.clone(), favorite.station_id.clone()),
            favorite,
        );
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    async fn enter(&self, call: RemoteCall) -> RemoteResult<()> {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected || self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::with_status("remote store unavailable", 503));
        }

        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn add_or_update_favorite(&self, favorite: &FavoriteEntity) -> RemoteResult<()> {
        self.enter(RemoteCall::Upsert {
            station_id: favorite.station_id.clone(),
            display_name: favorite.display_name.clone(),
        })
        .await?;

        let key = (favorite.user_id.clone(), favorite.station_id.clone());
        let mut slot = self.favorites.entry(key).or_insert_with(|| favorite.clone());
        if slot.last_updated_millis <= favorite.last_updated_millis {
            *slot = favorite.clone();
        }
        Ok(())
    }

    async fn remove_favorite(&self, user_id: &str, station_id: &str) -> RemoteResult<()> {
        self.enter(RemoteCall::Remove {
            station_id: station_id.to_string(),
        })
        .await?;
        self.favorites
            .remove(&(user_id.to_string(), station_id.to_string()));
        Ok(())
    }

    async fn update_favorite_position(
        &self,
        user_id: &str,
        station_id: &str,
        position: u32,
    ) -> RemoteResult<()> {
        self.enter(RemoteCall::Position {
            station_id: station_id.to_string(),
            position,
        })
        .await?;
        match self
            .favorites
            .get_mut(&(user_id.to_string(), station_id.to_string()))
        {
            Some(mut favorite) => {
                favorite.position = position;
                Ok(())
            }
            None => Err(RemoteError::with_status(
                format!("favorite {station_id} not found"),
                404,
            )),
        }
    }

    async fn get_favorites(&self, user_id: &str) -> RemoteResult<Vec<FavoriteEntity>> {
        self.enter(RemoteCall::List {
            user_id: user_id.to_string(),
        })
        .await?;
        Ok(self.records(user_id))
    }

    async fn is_favorite(&self, user_id: &str, station_id: &str) -> RemoteResult<bool> {
        self.enter(RemoteCall::Contains {
            station_id: station_id.to_string(),
        })
        .await?;
        Ok(self
            .favorites
            .contains_key(&(user_id.to_string(), station_id.to_string())))
    }
}
