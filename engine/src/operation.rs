//! Pending operations: mutations recorded while offline for later replay.

use crate::{FavoriteEntity, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Unique identifier for a pending operation.
pub type OperationId = String;

/// What a pending operation does when replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// Upsert the snapshot
    Add,
    /// Upsert the snapshot
    Update,
    /// Remove the snapshot's key
    Delete,
    /// Re-push the current position of every favorite
    Reorder,
}

impl OperationKind {
    /// Whether the kind carries an entity snapshot.
    pub fn needs_snapshot(self) -> bool {
        !matches!(self, OperationKind::Reorder)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Add => "ADD",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
            OperationKind::Reorder => "REORDER",
        };
        f.write_str(name)
    }
}

/// A mutation not yet confirmed by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Operation ID
    pub op_id: OperationId,
    /// Kind of mutation
    #[serde(rename = "operation")]
    pub kind: OperationKind,
    /// When the mutation was enqueued; replay order
    pub timestamp: Timestamp,
    /// Full entity for ADD/UPDATE/DELETE, absent for REORDER
    #[serde(default, rename = "favorite", skip_serializing_if = "Option::is_none")]
    pub favorite_snapshot: Option<FavoriteEntity>,
}

impl PendingOperation {
    pub fn new(
        kind: OperationKind,
        favorite_snapshot: Option<FavoriteEntity>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            op_id: uuid::Uuid::new_v4().to_string(),
            kind,
            timestamp,
            favorite_snapshot,
        }
    }

    pub fn add(favorite: FavoriteEntity, timestamp: Timestamp) -> Self {
        Self::new(OperationKind::Add, Some(favorite), timestamp)
    }

    pub fn update(favorite: FavoriteEntity, timestamp: Timestamp) -> Self {
        Self::new(OperationKind::Update, Some(favorite), timestamp)
    }

    pub fn delete(favorite: FavoriteEntity, timestamp: Timestamp) -> Self {
        Self::new(OperationKind::Delete, Some(favorite), timestamp)
    }

    pub fn reorder(timestamp: Timestamp) -> Self {
        Self::new(OperationKind::Reorder, None, timestamp)
    }

    /// Station this operation targets, if it targets one.
    pub fn station_id(&self) -> Option<&str> {
        self.favorite_snapshot
            .as_ref()
            .map(|f| f.station_id.as_str())
    }

    /// True when the entry can be replayed at all.
    pub fn is_well_formed(&self) -> bool {
        self.kind.needs_snapshot() == self.favorite_snapshot.is_some()
    }

    /// Replay order: timestamp first, then ID for a stable total order.
    pub fn replay_cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.op_id.cmp(&other.op_id))
    }
}

/// Sort a log into replay (FIFO) order.
pub fn sort_for_replay(ops: &mut [PendingOperation]) {
    ops.sort_by(PendingOperation::replay_cmp);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fav() -> FavoriteEntity {
        FavoriteEntity::new("user-1", "st-1", "Creek", 0, 1_000)
    }

    #[test]
    fn constructors_set_kind_and_snapshot() {
        let add = PendingOperation::add(fav(), 10);
        assert_eq!(add.kind, OperationKind::Add);
        assert_eq!(add.station_id(), Some("st-1"));
        assert!(add.is_well_formed());

        let reorder = PendingOperation::reorder(11);
        assert_eq!(reorder.kind, OperationKind::Reorder);
        assert_eq!(reorder.station_id(), None);
        assert!(reorder.is_well_formed());
    }

    #[test]
    fn ids_are_unique() {
        let a = PendingOperation::reorder(1);
        let b = PendingOperation::reorder(1);
        assert_ne!(a.op_id, b.op_id);
    }

    #[test]
    fn malformed_entries_detected() {
        let mut op = PendingOperation::update(fav(), 1);
        op.favorite_snapshot = None;
        assert!(!op.is_well_formed());
    }

    #[test]
    fn replay_order_is_by_timestamp_not_storage() {
        let mut log = vec![
            PendingOperation::update(fav(), 30),
            PendingOperation::add(fav(), 10),
            PendingOperation::reorder(20),
        ];
        sort_for_replay(&mut log);

        let kinds: Vec<_> = log.iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::Add,
                OperationKind::Reorder,
                OperationKind::Update
            ]
        );
    }

    #[test]
    fn serialization_format() {
        let op = PendingOperation::update(fav(), 42);
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["operation"], "UPDATE");
        assert_eq!(value["timestamp"], 42);
        assert_eq!(value["favorite"]["stationId"], "st-1");

        let reorder = serde_json::to_value(PendingOperation::reorder(1)).unwrap();
        assert!(reorder.get("favorite").is_none());
    }

    #[test]
    fn display_kind() {
        assert_eq!(OperationKind::Reorder.to_string(), "REORDER");
    }
}
