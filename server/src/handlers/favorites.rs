//! Favorites handlers - the remote store the sync engine writes through to.

use crate::db;
use crate::error::{AppError, Result};
use eddy_engine::FavoriteEntity;
use serde::Deserialize;
use sqlx::PgPool;

/// Request body for a position change.
#[derive(Debug, Deserialize)]
pub struct PositionRequest {
    pub position: u32,
}

/// Reject a body whose key disagrees with the URL it was sent to.
pub fn check_key(user_id: &str, station_id: &str, favorite: &FavoriteEntity) -> Result<()> {
    if !favorite.is_keyed(user_id, station_id) {
        return Err(AppError::BadRequest(format!(
            "body is keyed ({}, {}) but the path names ({user_id}, {station_id})",
            favorite.user_id, favorite.station_id
        )));
    }
    if favorite.station_id.trim().is_empty() {
        return Err(AppError::BadRequest("station id must not be empty".into()));
    }
    Ok(())
}

pub async fn handle_list(pool: &PgPool, user_id: &str) -> Result<Vec<FavoriteEntity>> {
    let favorites = db::list_favorites(pool, user_id).await?;
    tracing::debug!(user_id, count = favorites.len(), "listed favorites");
    Ok(favorites)
}

pub async fn handle_get(pool: &PgPool, user_id: &str, station_id: &str) -> Result<FavoriteEntity> {
    db::get_favorite(pool, user_id, station_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("favorite {station_id} for user {user_id}")))
}

/// Upsert a favorite and return the row as stored.
///
/// A stale write is accepted but leaves the newer row in place; the response
/// carries whichever version won.
pub async fn handle_put(
    pool: &PgPool,
    user_id: &str,
    station_id: &str,
    favorite: FavoriteEntity,
) -> Result<FavoriteEntity> {
    check_key(user_id, station_id, &favorite)?;

    let written = db::upsert_favorite(pool, &favorite).await?;
    if !written {
        tracing::info!(
            user_id,
            station_id,
            incoming = favorite.last_updated_millis,
            "ignored stale favorite write"
        );
    }

    handle_get(pool, user_id, station_id).await
}

/// Delete a favorite. Deleting an absent favorite succeeds so replays are idempotent.
pub async fn handle_delete(pool: &PgPool, user_id: &str, station_id: &str) -> Result<()> {
    if !db::delete_favorite(pool, user_id, station_id).await? {
        tracing::debug!(user_id, station_id, "delete of absent favorite");
    }
    Ok(())
}

pub async fn handle_position(
    pool: &PgPool,
    user_id: &str,
    station_id: &str,
    request: PositionRequest,
) -> Result<()> {
    if db::update_position(pool, user_id, station_id, request.position).await? {
        Ok(())
    } else {
        Err(AppError::NotFound(format!(
            "favorite {station_id} for user {user_id}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn favorite(user: &str, station: &str) -> FavoriteEntity {
        FavoriteEntity::new(user, station, "Lees Ferry", 0, 1_000)
    }

    #[test]
    fn matching_key_is_accepted() {
        assert!(check_key("user-1", "09380000", &favorite("user-1", "09380000")).is_ok());
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let err = check_key("user-1", "09380000", &favorite("user-2", "09380000")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = check_key("user-1", "09380000", &favorite("user-1", "09999999")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn blank_station_is_rejected() {
        let err = check_key("user-1", " ", &favorite("user-1", " ")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
