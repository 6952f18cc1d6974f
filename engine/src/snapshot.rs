//! Persisted record layouts for the offline cache.
//!
//! Two records exist per user: a favorites snapshot and a pending-operation
//! log. Both are JSON with camelCase keys and carry a format version so a
//! newer layout is rejected instead of being misread.

use crate::{
    entity::decode_source_name, error::Result, Error, FavoriteEntity, GeoLocation,
    PendingOperation, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

/// Version of the persisted layout.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// One favorite as stored on disk.
///
/// The conversions to and from [`FavoriteEntity`] destructure every field, so
/// adding a field to the entity fails to compile until it is persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRecord {
    pub station_id: String,
    pub user_id: String,
    pub position: u32,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_source_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub image_index: u32,
    #[serde(default)]
    pub custom_image_path: Option<String>,
    pub last_updated_millis: Timestamp,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl From<&FavoriteEntity> for FavoriteRecord {
    fn from(entity: &FavoriteEntity) -> Self {
        let FavoriteEntity {
            station_id,
            user_id,
            position,
            display_name,
            original_source_name,
            description,
            image_index,
            custom_image_path,
            last_updated_millis,
            geo:
                GeoLocation {
                    lat,
                    lon,
                    elevation,
                    city,
                    state,
                },
        } = entity;

        Self {
            station_id: station_id.clone(),
            user_id: user_id.clone(),
            position: *position,
            display_name: display_name.clone(),
            original_source_name: decode_source_name(original_source_name.clone()),
            description: description.clone(),
            image_index: *image_index,
            custom_image_path: custom_image_path.clone(),
            last_updated_millis: *last_updated_millis,
            lat: *lat,
            lon: *lon,
            elevation: *elevation,
            city: city.clone(),
            state: state.clone(),
        }
    }
}

impl From<FavoriteRecord> for FavoriteEntity {
    fn from(record: FavoriteRecord) -> Self {
        let FavoriteRecord {
            station_id,
            user_id,
            position,
            display_name,
            original_source_name,
            description,
            image_index,
            custom_image_path,
            last_updated_millis,
            lat,
            lon,
            elevation,
            city,
            state,
        } = record;

        Self {
            station_id,
            user_id,
            position,
            display_name,
            original_source_name: decode_source_name(original_source_name),
            description,
            image_index,
            custom_image_path,
            last_updated_millis,
            geo: GeoLocation {
                lat,
                lon,
                elevation,
                city,
                state,
            },
        }
    }
}

/// The last known favorites list of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoritesSnapshot {
    /// Layout version
    pub format_version: u32,
    /// Owner of the list
    pub user_id: UserId,
    /// When the snapshot was written (milliseconds since epoch)
    pub timestamp: Timestamp,
    /// Favorites in display order
    pub favorites: Vec<FavoriteRecord>,
}

impl FavoritesSnapshot {
    pub fn new(user_id: impl Into<UserId>, favorites: &[FavoriteEntity], timestamp: Timestamp) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            user_id: user_id.into(),
            timestamp,
            favorites: favorites.iter().map(FavoriteRecord::from).collect(),
        }
    }

    /// Convert back to entities, ordered by position.
    pub fn into_favorites(self) -> Vec<FavoriteEntity> {
        let mut favorites: Vec<FavoriteEntity> =
            self.favorites.into_iter().map(FavoriteEntity::from).collect();
        favorites.sort_by_key(|f| f.position);
        favorites
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        check_format_version(snapshot.format_version)?;
        Ok(snapshot)
    }
}

/// The durable log of operations awaiting replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingLog {
    #[serde(default = "current_format_version")]
    pub format_version: u32,
    /// Entries in storage order, which is not replay order
    pub operations: Vec<PendingOperation>,
}

impl PendingLog {
    pub fn new(operations: Vec<PendingOperation>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            operations,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let log: Self = serde_json::from_str(json)?;
        check_format_version(log.format_version)?;
        Ok(log)
    }
}

fn current_format_version() -> u32 {
    SNAPSHOT_FORMAT_VERSION
}

fn check_format_version(found: u32) -> Result<()> {
    if found > SNAPSHOT_FORMAT_VERSION {
        return Err(Error::InvalidSnapshot(format!(
            "unsupported format version: {} (max supported: {})",
            found, SNAPSHOT_FORMAT_VERSION
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_entity() -> FavoriteEntity {
        FavoriteEntity::new("user-1", "13317000", "Salmon at White Bird", 1, 5_000)
            .with_original_source_name(Some("SALMON RIVER AT WHITE BIRD ID".into()))
            .with_description(Some("Low water run".into()))
            .with_geo(
                GeoLocation::at(45.75, -116.32)
                    .with_elevation(441.0)
                    .with_place("White Bird", "ID"),
            )
            .with_image_index(6)
            .with_custom_image(Some("/img/salmon.jpg".into()), 5_000)
    }

    #[test]
    fn record_roundtrip_keeps_every_field() {
        let entity = full_entity();
        let record = FavoriteRecord::from(&entity);
        assert_eq!(record.city.as_deref(), Some("White Bird"));
        assert_eq!(record.elevation, Some(441.0));
        assert_eq!(FavoriteEntity::from(record), entity);
    }

    #[test]
    fn missing_source_name_is_omitted() {
        let entity = FavoriteEntity::new("u", "s", "Name", 0, 1);
        let json = serde_json::to_value(FavoriteRecord::from(&entity)).unwrap();
        assert!(json.get("originalSourceName").is_none());
    }

    #[test]
    fn sentinel_source_name_reads_as_none() {
        let json = r#"{
            "stationId": "s",
            "userId": "u",
            "position": 0,
            "displayName": "Name",
            "originalSourceName": "null",
            "imageIndex": 2,
            "lastUpdatedMillis": 7
        }"#;
        let record: FavoriteRecord = serde_json::from_str(json).unwrap();
        let entity = FavoriteEntity::from(record);
        assert_eq!(entity.original_source_name, None);
        assert_eq!(entity.image_index, 2);
    }

    #[test]
    fn blank_source_name_is_kept() {
        let mut entity = FavoriteEntity::new("u", "s", "Name", 0, 1);
        entity.original_source_name = Some(String::new());
        let json = serde_json::to_string(&FavoriteRecord::from(&entity)).unwrap();
        let record: FavoriteRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(FavoriteEntity::from(record), entity);
    }

    #[test]
    fn snapshot_orders_by_position() {
        let a = FavoriteEntity::new("u", "a", "A", 1, 1);
        let b = FavoriteEntity::new("u", "b", "B", 0, 1);
        let snapshot = FavoritesSnapshot::new("u", &[a, b], 99);

        let restored = FavoritesSnapshot::from_json(&snapshot.to_json().unwrap())
            .unwrap()
            .into_favorites();
        let ids: Vec<_> = restored.iter().map(|f| f.station_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn snapshot_layout() {
        let snapshot = FavoritesSnapshot::new("u", &[full_entity()], 1234);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["userId"], "u");
        assert_eq!(value["timestamp"], 1234);
        assert_eq!(value["favorites"][0]["state"], "ID");
    }

    #[test]
    fn reject_future_format_version() {
        let json = r#"{
            "formatVersion": 999,
            "userId": "u",
            "timestamp": 0,
            "favorites": []
        }"#;
        let result = FavoritesSnapshot::from_json(json);
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));

        let result = PendingLog::from_json(r#"{"formatVersion": 2, "operations": []}"#);
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn pending_log_without_version_reads_as_current() {
        let log = PendingLog::from_json(r#"{"operations": []}"#).unwrap();
        assert_eq!(log.format_version, SNAPSHOT_FORMAT_VERSION);
        assert!(log.operations.is_empty());
    }

    #[test]
    fn pending_log_roundtrip() {
        let log = PendingLog::new(vec![
            PendingOperation::add(full_entity(), 10),
            PendingOperation::reorder(11),
        ]);
        let restored = PendingLog::from_json(&log.to_json().unwrap()).unwrap();
        assert_eq!(restored, log);
    }
}
