pub mod endpoints;
mod error;

pub use crate::error::{ErrorDetail, SpotifyApiError};
use endpoints::{player::CurrentlyPlaying, users::UserProfile};
use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

pub const BASE_URL: &str = "https://api.spotify.com/v1";

/// Bearer-authenticated client for the parts of the Spotify Web API we use.
///
/// A client is bound to a single access token. Token refresh is the
/// caller's job; a client built with an expired token will get a 401 back.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    access_token: SecretString,
}

impl Client {
    pub fn new(access_token: &str) -> Self {
        Self::with_http_client(reqwest::Client::new(), BASE_URL, access_token)
    }

    /// Reuse an existing connection pool, optionally against another base URL
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        access_token: &str,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            access_token: SecretString::from(access_token.to_owned()),
        }
    }

    /// `GET /me/player/currently-playing`
    ///
    /// Returns `Ok(None)` when Spotify answers `204 No Content`, which means
    /// nothing is playing right now.
    pub async fn currently_playing(&self) -> Result<Option<CurrentlyPlaying>, SpotifyApiError> {
        let response = self.get(endpoints::player::CURRENTLY_PLAYING).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    /// `GET /me`
    pub async fn current_user(&self) -> Result<UserProfile, SpotifyApiError> {
        let response = self.get(endpoints::users::CURRENT_USER).await?;
        decode(response).await
    }

    async fn get(&self, endpoint: &str) -> Result<Response, SpotifyApiError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint);
        let response = self
            .http
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await?;
        Err(SpotifyApiError::from_response(status, &body))
    }
}

async fn decode<T>(response: Response) -> Result<T, SpotifyApiError>
where
    T: DeserializeOwned,
{
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(SpotifyApiError::Decode)
}
