use async_trait::async_trait;
use spotify_web_api::{
    endpoints::{player::CurrentlyPlaying, users::UserProfile},
    Client,
};
use std::sync::Arc;
use std::time::Duration;

use super::AuthorizationProvider;
use crate::common::Token;
use crate::server::config::SpotifyConfiguration;
use crate::server::error::ServerError;

/// Result of an upstream call plus the token that had to be minted for it, if any.
///
/// Callers that store tokens must persist `refreshed`, otherwise the next
/// call refreshes again.
#[derive(Debug, Clone)]
pub struct Authorized<T> {
    pub value: T,
    pub refreshed: Option<Token>,
}

impl<T> Authorized<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            refreshed: None,
        }
    }
}

/// The Spotify Web API, as seen by the session manager and the track cache
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    /// `None` means Spotify answered "no content": nothing is playing
    async fn currently_playing(
        &self,
        token: &Token,
    ) -> Result<Authorized<Option<CurrentlyPlaying>>, ServerError>;

    async fn current_user(&self, token: &Token) -> Result<Authorized<UserProfile>, ServerError>;
}

/// Authorizing transport: refreshes expired tokens before calling Spotify
pub struct SpotifyService {
    http: reqwest::Client,
    base_url: String,
    provider: Arc<dyn AuthorizationProvider>,
}

impl SpotifyService {
    pub fn new(
        config: &SpotifyConfiguration,
        timeout: Duration,
        provider: Arc<dyn AuthorizationProvider>,
    ) -> Result<Self, ServerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            provider,
        })
    }

    /// Client for `token`, refreshing it first if it has expired
    async fn authorize(&self, token: &Token) -> Result<(Client, Option<Token>), ServerError> {
        if !token.is_expired() {
            return Ok((self.client(token), None));
        }

        tracing::debug!(expires_at = %token.expires_at, "Access token expired, refreshing");
        let refreshed = self.provider.refresh_token(token).await?;
        Ok((self.client(&refreshed), Some(refreshed)))
    }

    fn client(&self, token: &Token) -> Client {
        Client::with_http_client(self.http.clone(), self.base_url.as_str(), &token.access_token)
    }
}

#[async_trait]
impl SpotifyApi for SpotifyService {
    async fn currently_playing(
        &self,
        token: &Token,
    ) -> Result<Authorized<Option<CurrentlyPlaying>>, ServerError> {
        let (client, refreshed) = self.authorize(token).await?;
        let value = client.currently_playing().await?;
        Ok(Authorized { value, refreshed })
    }

    async fn current_user(&self, token: &Token) -> Result<Authorized<UserProfile>, ServerError> {
        let (client, refreshed) = self.authorize(token).await?;
        let value = client.current_user().await?;
        Ok(Authorized { value, refreshed })
    }
}
