//! [`RemoteStore`] over the eddy-server REST API.
//!
//! Routes:
//!
//! - `GET    /users/{userId}/favorites`
//! - `GET    /users/{userId}/favorites/{stationId}` (404 when absent)
//! - `PUT    /users/{userId}/favorites/{stationId}`
//! - `DELETE /users/{userId}/favorites/{stationId}`
//! - `PATCH  /users/{userId}/favorites/{stationId}/position`

use crate::{FavoriteEntity, RemoteError, RemoteResult, RemoteStore};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Serialize;

#[derive(Serialize)]
struct PositionBody {
    position: u32,
}

/// HTTP client for the favorites backend.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base: Url,
}

impl HttpRemoteStore {
    /// Client rooted at `base_url`, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str) -> RemoteResult<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> RemoteResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| RemoteError::new(format!("invalid base url '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::new(format!(
                "base url '{base_url}' cannot have a path"
            )));
        }
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build a URL from path segments. Each segment is percent-encoded.
    fn url(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::new("base url cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn favorite_url(&self, user_id: &str, station_id: &str) -> RemoteResult<Url> {
        self.url(&["users", user_id, "favorites", station_id])
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    match e.status() {
        Some(status) => RemoteError::with_status(e.to_string(), status.as_u16()),
        None => RemoteError::new(e.to_string()),
    }
}

/// Turn a non-success response into a [`RemoteError`] carrying the body.
async fn check(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        format!("remote store returned {status}")
    } else {
        format!("remote store returned {status}: {body}")
    };
    Err(RemoteError::with_status(message, status.as_u16()))
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn add_or_update_favorite(&self, favorite: &FavoriteEntity) -> RemoteResult<()> {
        let url = self.favorite_url(&favorite.user_id, &favorite.station_id)?;
        let response = self
            .client
            .put(url)
            .json(favorite)
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?;
        Ok(())
    }

    async fn remove_favorite(&self, user_id: &str, station_id: &str) -> RemoteResult<()> {
        let url = self.favorite_url(user_id, station_id)?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?;
        Ok(())
    }

    async fn update_favorite_position(
        &self,
        user_id: &str,
        station_id: &str,
        position: u32,
    ) -> RemoteResult<()> {
        let url = self.url(&["users", user_id, "favorites", station_id, "position"])?;
        let response = self
            .client
            .patch(url)
            .json(&PositionBody { position })
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?;
        Ok(())
    }

    async fn get_favorites(&self, user_id: &str) -> RemoteResult<Vec<FavoriteEntity>> {
        let url = self.url(&["users", user_id, "favorites"])?;
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)
    }

    async fn is_favorite(&self, user_id: &str, station_id: &str) -> RemoteResult<bool> {
        let url = self.favorite_url(user_id, station_id)?;
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_encoded() {
        let store = HttpRemoteStore::new("http://localhost:3000/api/").unwrap();
        let url = store.favorite_url("user 1", "a/b").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/users/user%201/favorites/a%2Fb"
        );
    }

    #[test]
    fn rejects_unusable_base() {
        assert!(HttpRemoteStore::new("not a url").is_err());
        assert!(HttpRemoteStore::new("mailto:someone@example.com").is_err());
    }
}
