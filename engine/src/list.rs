//! The authoritative in-memory favorites list and its observers.
//!
//! All mutations here are synchronous: the lock is never held across an
//! await, and observers see every change before any I/O starts.

use crate::{error::Result, ordering, FavoriteEntity, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;

/// What the sync engine may do with the list.
///
/// Passed as a capability instead of a handle to the whole store.
pub trait FavoritesView: Send + Sync {
    /// Current favorites in display order.
    fn snapshot(&self) -> Vec<FavoriteEntity>;

    /// Replace the list wholesale and notify observers.
    fn replace_all(&self, favorites: Vec<FavoriteEntity>);

    /// Counter bumped by every change to the list.
    fn version(&self) -> u64;

    /// Replace the list only if it is still at `version`. Returns whether it was replaced.
    fn replace_if_unchanged(&self, version: u64, favorites: Vec<FavoriteEntity>) -> bool;
}

/// Ordered favorites of the signed-in user.
#[derive(Debug)]
pub struct FavoritesList {
    items: RwLock<Vec<FavoriteEntity>>,
    /// Only written while `items` is write-locked.
    version: AtomicU64,
    notifier: watch::Sender<Vec<FavoriteEntity>>,
}

impl Default for FavoritesList {
    fn default() -> Self {
        Self::new()
    }
}

impl FavoritesList {
    pub fn new() -> Self {
        let (notifier, _rx) = watch::channel(Vec::new());
        Self {
            items: RwLock::new(Vec::new()),
            version: AtomicU64::new(0),
            notifier,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<FavoriteEntity>> {
        self.notifier.subscribe()
    }

    pub fn read<R>(&self, f: impl FnOnce(&[FavoriteEntity]) -> R) -> R {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        f(&items)
    }

    /// Mutate under the write lock, then notify observers with the result.
    fn write<R>(&self, f: impl FnOnce(&mut Vec<FavoriteEntity>) -> R) -> R {
        let (result, published) = {
            let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut items);
            self.version.fetch_add(1, Ordering::SeqCst);
            (result, items.clone())
        };
        self.notifier.send_replace(published);
        result
    }

    pub fn len(&self) -> usize {
        self.read(|items| items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_for(&self, user_id: &str) -> usize {
        self.read(|items| items.iter().filter(|f| f.user_id == user_id).count())
    }

    pub fn contains(&self, user_id: &str, station_id: &str) -> bool {
        self.find(user_id, station_id).is_some()
    }

    pub fn find(&self, user_id: &str, station_id: &str) -> Option<FavoriteEntity> {
        self.read(|items| {
            items
                .iter()
                .find(|f| f.is_keyed(user_id, station_id))
                .cloned()
        })
    }

    /// Favorites of `user_id` in display order.
    pub fn for_user(&self, user_id: &str) -> Vec<FavoriteEntity> {
        self.read(|items| {
            items
                .iter()
                .filter(|f| f.user_id == user_id)
                .cloned()
                .collect()
        })
    }

    /// Add a favorite and keep the list sorted by position.
    pub fn insert_sorted(&self, favorite: FavoriteEntity) {
        self.write(|items| {
            items.push(favorite);
            ordering::sort_by_position(items);
        });
    }

    /// Swap in a new version of an existing favorite. Returns false if absent.
    pub fn replace(&self, favorite: FavoriteEntity) -> bool {
        self.write(|items| {
            match items
                .iter_mut()
                .find(|f| f.is_keyed(&favorite.user_id, &favorite.station_id))
            {
                Some(slot) => {
                    *slot = favorite;
                    true
                }
                None => false,
            }
        })
    }

    /// Remove a favorite and renumber the rest.
    ///
    /// Returns the original index, the removed entity, and whether any
    /// remaining favorite changed position.
    pub fn remove(
        &self,
        user_id: &str,
        station_id: &str,
        now: Timestamp,
    ) -> Option<(usize, FavoriteEntity, bool)> {
        self.write(|items| {
            let index = items.iter().position(|f| f.is_keyed(user_id, station_id))?;
            let removed = items.remove(index);
            let shifted = index < items.len();
            *items = ordering::renumber(std::mem::take(items), now);
            Some((index, removed, shifted))
        })
    }

    /// Put a favorite back at `index` (clamped) and renumber.
    pub fn reinsert(&self, index: usize, favorite: FavoriteEntity, now: Timestamp) {
        self.write(|items| {
            let index = index.min(items.len());
            items.insert(index, favorite);
            *items = ordering::renumber(std::mem::take(items), now);
        });
    }

    /// Apply a list move and renumber. Returns whether anything changed.
    ///
    /// Invalid indices leave the list untouched and notify nobody.
    pub fn reorder(&self, old_index: usize, new_index: usize, now: Timestamp) -> Result<bool> {
        let mut moved = self.read(|items| items.to_vec());
        ordering::move_item(&mut moved, old_index, new_index)?;
        let moved = ordering::renumber(moved, now);

        let unchanged = self.read(|items| {
            items
                .iter()
                .map(|f| &f.station_id)
                .eq(moved.iter().map(|f| &f.station_id))
        });
        if unchanged {
            return Ok(false);
        }
        self.write(|items| *items = moved);
        Ok(true)
    }
}

impl FavoritesView for FavoritesList {
    fn snapshot(&self) -> Vec<FavoriteEntity> {
        self.read(|items| items.to_vec())
    }

    fn replace_all(&self, favorites: Vec<FavoriteEntity>) {
        self.write(|items| *items = favorites);
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn replace_if_unchanged(&self, version: u64, favorites: Vec<FavoriteEntity>) -> bool {
        let published = {
            let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
            if self.version.load(Ordering::SeqCst) != version {
                return false;
            }
            *items = favorites;
            self.version.fetch_add(1, Ordering::SeqCst);
            items.clone()
        };
        self.notifier.send_replace(published);
        true
    }
}
