//! # Eddy Engine
//!
//! Offline-first sync of a user's favorite river stations.
//!
//! The engine keeps an ordered favorites list in memory, mirrors it to a
//! remote store when the device is online, and records mutations in a durable
//! pending-operation log when it is not. On reconnect the log is replayed in
//! the order the mutations happened.
//!
//! ## Design Principles
//!
//! - **Optimistic**: edits show up in the list before any I/O
//! - **Durable**: every offline mutation survives a restart
//! - **Idempotent replay**: upserts keyed by `(userId, stationId)` can be repeated safely
//! - **Pluggable**: remote store, storage, connectivity, names and time are traits
//!
//! ## Core Concepts
//!
//! ### Favorites
//!
//! A [`FavoriteEntity`] is an immutable value keyed by `(userId, stationId)`.
//! Positions are 0-based and gap-free after every mutation.
//!
//! ### Pending operations
//!
//! A [`PendingOperation`] records an ADD, UPDATE, DELETE or REORDER made
//! while offline. The [`OfflineCache`] keeps the log next to a snapshot of
//! the list, both as JSON in a [`KeyValueStore`].
//!
//! ### Sync
//!
//! The [`SyncEngine`] sends each mutation to the [`RemoteStore`] or to the log,
//! replays the log on reconnect, and debounces cache writes and reloads.
//!
//! ## Quick Start
//!
//! ```rust
//! use eddy_engine::{
//!     Collaborators, EngineConfig, FavoritesStore, ManualConnectivity, MemoryKv,
//!     MemoryNameResolver, MemoryRemoteStore, NewFavorite, SystemClock,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> eddy_engine::Result<()> {
//! let store = FavoritesStore::new(
//!     Collaborators {
//!         remote: Arc::new(MemoryRemoteStore::new()),
//!         connectivity: Arc::new(ManualConnectivity::new(true)),
//!         storage: Arc::new(MemoryKv::new()),
//!         names: Arc::new(MemoryNameResolver::new()),
//!         clock: Arc::new(SystemClock),
//!     },
//!     EngineConfig::default(),
//! );
//!
//! store
//!     .add_favorite(NewFavorite::new("user-1", "09380000").with_display_name("Lees Ferry"))
//!     .await?;
//! assert_eq!(store.favorites().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod debounce;
pub mod entity;
pub mod error;
pub mod http;
pub mod kv;
pub mod list;
pub mod names;
pub mod operation;
pub mod ordering;
pub mod processing;
pub mod remote;
pub mod snapshot;
pub mod store;
pub mod sync;

// Re-export main types at crate root
pub use cache::{CachedFavorites, OfflineCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use connectivity::{ConnectivityMonitor, ManualConnectivity, ReconnectWatch};
pub use entity::{FavoriteEntity, GeoLocation, ImageSelection};
pub use error::{Error, KvError, RemoteError, Result};
pub use http::HttpRemoteStore;
pub use kv::{FileKv, KeyValueStore, MemoryKv};
pub use list::{FavoritesList, FavoritesView};
pub use names::{MemoryNameResolver, NameInfo, NameResolutionService};
pub use operation::{OperationId, OperationKind, PendingOperation};
pub use processing::{ProcessingFlag, ProcessingGuard};
pub use remote::{MemoryRemoteStore, RemoteCall, RemoteResult, RemoteStore};
pub use snapshot::{FavoriteRecord, FavoritesSnapshot, PendingLog, SNAPSHOT_FORMAT_VERSION};
pub use store::{Collaborators, FavoritesStore, NewFavorite};
pub use sync::{Durability, Mutation, ReplayReport, SyncDeps, SyncEngine, SyncMode};

/// Type aliases for clarity
pub type StationId = String;
pub type UserId = String;
pub type Timestamp = u64;
