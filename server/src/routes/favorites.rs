//! Favorites endpoint routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use eddy_engine::FavoriteEntity;

use crate::error::Result;
use crate::handlers::{
    handle_delete, handle_get, handle_list, handle_position, handle_put, PositionRequest,
};
use crate::AppState;

/// Create favorites routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{user_id}/favorites", get(list_handler))
        .route(
            "/users/{user_id}/favorites/{station_id}",
            get(get_handler).put(put_handler).delete(delete_handler),
        )
        .route(
            "/users/{user_id}/favorites/{station_id}/position",
            patch(position_handler),
        )
}

/// GET /users/{user_id}/favorites - List favorites in position order.
async fn list_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<FavoriteEntity>>> {
    Ok(Json(handle_list(&state.pool, &user_id).await?))
}

/// GET /users/{user_id}/favorites/{station_id} - One favorite, 404 when absent.
async fn get_handler(
    State(state): State<AppState>,
    Path((user_id, station_id)): Path<(String, String)>,
) -> Result<Json<FavoriteEntity>> {
    Ok(Json(handle_get(&state.pool, &user_id, &station_id).await?))
}

/// PUT /users/{user_id}/favorites/{station_id} - Add or update.
async fn put_handler(
    State(state): State<AppState>,
    Path((user_id, station_id)): Path<(String, String)>,
    Json(favorite): Json<FavoriteEntity>,
) -> Result<Json<FavoriteEntity>> {
    Ok(Json(
        handle_put(&state.pool, &user_id, &station_id, favorite).await?,
    ))
}

/// DELETE /users/{user_id}/favorites/{station_id} - Remove.
async fn delete_handler(
    State(state): State<AppState>,
    Path((user_id, station_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    handle_delete(&state.pool, &user_id, &station_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /users/{user_id}/favorites/{station_id}/position - Move.
async fn position_handler(
    State(state): State<AppState>,
    Path((user_id, station_id)): Path<(String, String)>,
    Json(request): Json<PositionRequest>,
) -> Result<StatusCode> {
    handle_position(&state.pool, &user_id, &station_id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}
