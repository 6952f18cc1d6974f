//! The favorite record.
//!
//! A [`FavoriteEntity`] is a plain value. Every change produces a new value
//! through one of the `with_*`/`renamed`/`at_position` methods, which keep all
//! fields they do not target and never move `last_updated_millis` backwards.

use crate::{StationId, Timestamp, UserId};
use serde::{Deserialize, Deserializer, Serialize};

/// Literal that older stores wrote in place of a missing source name.
pub const NULL_SENTINEL: &str = "null";

/// Optional location details for a station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    /// Elevation in meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl GeoLocation {
    pub fn at(lat: f64, lon: f64) -> Self {
        Self {
            lat: Some(lat),
            lon: Some(lon),
            ..Self::default()
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_place(mut self, city: impl Into<String>, state: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self.state = Some(state.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Which image the UI should show for a favorite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSelection<'a> {
    /// A user-supplied image file.
    Custom(&'a str),
    /// One of the bundled images.
    Builtin(u32),
}

/// A favorite river station of one user.
///
/// `(user_id, station_id)` is the natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntity {
    /// Stable identifier of the station at the upstream data provider
    pub station_id: StationId,
    /// Owner of this favorite
    pub user_id: UserId,
    /// Display order, 0-based and gap-free per user
    pub position: u32,
    /// User-visible, user-editable name
    pub display_name: String,
    /// Name as provided upstream when the favorite was created
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_source_name"
    )]
    pub original_source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Index into the bundled image set
    pub image_index: u32,
    /// Overrides `image_index` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_image_path: Option<String>,
    /// Last modification time (milliseconds since epoch)
    pub last_updated_millis: Timestamp,
    #[serde(flatten)]
    pub geo: GeoLocation,
}

impl FavoriteEntity {
    /// Create a new favorite with default image and no optional details.
    pub fn new(
        user_id: impl Into<UserId>,
        station_id: impl Into<StationId>,
        display_name: impl Into<String>,
        position: u32,
        now: Timestamp,
    ) -> Self {
        Self {
            station_id: station_id.into(),
            user_id: user_id.into(),
            position,
            display_name: display_name.into(),
            original_source_name: None,
            description: None,
            image_index: 0,
            custom_image_path: None,
            last_updated_millis: now,
            geo: GeoLocation::default(),
        }
    }

    pub fn with_original_source_name(mut self, name: Option<String>) -> Self {
        if let Some(name) = normalize_source_name(name) {
            self.original_source_name = Some(name);
        }
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_geo(mut self, geo: GeoLocation) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_image_index(mut self, image_index: u32) -> Self {
        self.image_index = image_index;
        self
    }

    /// Whether `(user_id, station_id)` is this favorite's key.
    pub fn is_keyed(&self, user_id: &str, station_id: &str) -> bool {
        self.user_id == user_id && self.station_id == station_id
    }

    /// True when the source name is present and not a placeholder.
    pub fn has_meaningful_source_name(&self) -> bool {
        self.original_source_name
            .as_deref()
            .is_some_and(is_meaningful_name)
    }

    pub fn image(&self) -> ImageSelection<'_> {
        match self.custom_image_path.as_deref() {
            Some(path) if !path.is_empty() => ImageSelection::Custom(path),
            _ => ImageSelection::Builtin(self.image_index),
        }
    }

    /// Fill in the source name if it is missing. A meaningful one is kept.
    pub fn backfilled(mut self, source_name: Option<String>) -> Self {
        if !self.has_meaningful_source_name() {
            if let Some(name) = normalize_source_name(source_name) {
                self.original_source_name = Some(name);
            }
        }
        self
    }

    pub fn renamed(self, display_name: impl Into<String>, now: Timestamp) -> Self {
        Self {
            display_name: display_name.into(),
            ..self.touched(now)
        }
    }

    pub fn with_image(self, image_index: u32, now: Timestamp) -> Self {
        Self {
            image_index,
            ..self.touched(now)
        }
    }

    pub fn with_custom_image(self, path: Option<String>, now: Timestamp) -> Self {
        Self {
            custom_image_path: path.filter(|p| !p.is_empty()),
            ..self.touched(now)
        }
    }

    pub fn described(self, description: Option<String>, now: Timestamp) -> Self {
        Self {
            description,
            ..self.touched(now)
        }
    }

    /// Move to `position`. The timestamp only changes if the position does.
    pub fn at_position(self, position: u32, now: Timestamp) -> Self {
        if self.position == position {
            return self;
        }
        Self {
            position,
            ..self.touched(now)
        }
    }

    /// Bump `last_updated_millis` to `now` unless it is already later.
    pub fn touched(mut self, now: Timestamp) -> Self {
        self.last_updated_millis = self.last_updated_millis.max(now);
        self
    }
}

/// True for names that carry information: not empty and not the sentinel.
pub fn is_meaningful_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed != NULL_SENTINEL
}

/// Map the sentinel and empty strings to `None`.
pub fn normalize_source_name(name: Option<String>) -> Option<String> {
    name.filter(|n| is_meaningful_name(n))
}

/// Map only the stored sentinel to `None`; any other value is kept as-is.
///
/// Used when reading persisted or wire data, so a written entity reads back
/// unchanged.
pub fn decode_source_name(name: Option<String>) -> Option<String> {
    name.filter(|n| n != NULL_SENTINEL)
}

fn deserialize_source_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(decode_source_name)
}
