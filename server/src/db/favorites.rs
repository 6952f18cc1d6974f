//! Database operations for the favorites table.

use eddy_engine::entity::decode_source_name;
use eddy_engine::{FavoriteEntity, GeoLocation};
use sqlx::{PgPool, Row};

const COLUMNS: &str = "user_id, station_id, position, display_name, original_source_name, \
    description, image_index, custom_image_path, last_updated_millis, \
    lat, lon, elevation, city, state";

/// A stored favorite row from the database.
#[derive(Debug)]
pub struct StoredFavorite {
    pub user_id: String,
    pub station_id: String,
    pub position: i32,
    pub display_name: String,
    pub original_source_name: Option<String>,
    pub description: Option<String>,
    pub image_index: i32,
    pub custom_image_path: Option<String>,
    pub last_updated_millis: i64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub elevation: Option<f64>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredFavorite {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredFavorite {
            user_id: row.try_get("user_id")?,
            station_id: row.try_get("station_id")?,
            position: row.try_get("position")?,
            display_name: row.try_get("display_name")?,
            original_source_name: row.try_get("original_source_name")?,
            description: row.try_get("description")?,
            image_index: row.try_get("image_index")?,
            custom_image_path: row.try_get("custom_image_path")?,
            last_updated_millis: row.try_get("last_updated_millis")?,
            lat: row.try_get("lat")?,
            lon: row.try_get("lon")?,
            elevation: row.try_get("elevation")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
        })
    }
}

impl StoredFavorite {
    /// Convert database row to an engine favorite.
    pub fn into_entity(self) -> FavoriteEntity {
        let mut favorite = FavoriteEntity::new(
            self.user_id,
            self.station_id,
            self.display_name,
            self.position.max(0) as u32,
            self.last_updated_millis.max(0) as u64,
        )
        .with_description(self.description)
        .with_image_index(self.image_index.max(0) as u32)
        .with_geo(GeoLocation {
            lat: self.lat,
            lon: self.lon,
            elevation: self.elevation,
            city: self.city,
            state: self.state,
        });
        favorite.original_source_name = decode_source_name(self.original_source_name);
        favorite.custom_image_path = self.custom_image_path;
        favorite
    }
}

/// Insert or update a favorite.
///
/// An existing row is only overwritten when the incoming favorite is at least
/// as recent, so a late replay cannot clobber a newer edit. Returns whether
/// the row was written.
pub async fn upsert_favorite(pool: &PgPool, favorite: &FavoriteEntity) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO favorites (
            user_id, station_id, position, display_name, original_source_name,
            description, image_index, custom_image_path, last_updated_millis,
            lat, lon, elevation, city, state
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (user_id, station_id) DO UPDATE SET
            position = EXCLUDED.position,
            display_name = EXCLUDED.display_name,
            original_source_name = EXCLUDED.original_source_name,
            description = EXCLUDED.description,
            image_index = EXCLUDED.image_index,
            custom_image_path = EXCLUDED.custom_image_path,
            last_updated_millis = EXCLUDED.last_updated_millis,
            lat = EXCLUDED.lat,
            lon = EXCLUDED.lon,
            elevation = EXCLUDED.elevation,
            city = EXCLUDED.city,
            state = EXCLUDED.state
        WHERE favorites.last_updated_millis <= EXCLUDED.last_updated_millis
        "#,
    )
    .bind(&favorite.user_id)
    .bind(&favorite.station_id)
    .bind(favorite.position as i32)
    .bind(&favorite.display_name)
    .bind(&favorite.original_source_name)
    .bind(&favorite.description)
    .bind(favorite.image_index as i32)
    .bind(&favorite.custom_image_path)
    .bind(favorite.last_updated_millis as i64)
    .bind(favorite.geo.lat)
    .bind(favorite.geo.lon)
    .bind(favorite.geo.elevation)
    .bind(&favorite.geo.city)
    .bind(&favorite.geo.state)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Get one favorite.
pub async fn get_favorite(
    pool: &PgPool,
    user_id: &str,
    station_id: &str,
) -> Result<Option<FavoriteEntity>, sqlx::Error> {
    let row: Option<StoredFavorite> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM favorites WHERE user_id = $1 AND station_id = $2"
    ))
    .bind(user_id)
    .bind(station_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(StoredFavorite::into_entity))
}

/// List a user's favorites in position order.
pub async fn list_favorites(pool: &PgPool, user_id: &str) -> Result<Vec<FavoriteEntity>, sqlx::Error> {
    let rows: Vec<StoredFavorite> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM favorites WHERE user_id = $1 ORDER BY position ASC, station_id ASC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StoredFavorite::into_entity).collect())
}

/// Delete a favorite. Returns whether a row existed.
pub async fn delete_favorite(pool: &PgPool, user_id: &str, station_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND station_id = $2")
        .bind(user_id)
        .bind(station_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Move a favorite to `position`. Returns whether the favorite exists.
pub async fn update_position(
    pool: &PgPool,
    user_id: &str,
    station_id: &str,
    position: u32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE favorites SET position = $3 WHERE user_id = $1 AND station_id = $2",
    )
    .bind(user_id)
    .bind(station_id)
    .bind(position as i32)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
