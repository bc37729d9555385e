use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{Duration as ChronoDuration, Utc};
use spotify_web_api::{
    endpoints::{
        player::{CurrentlyPlaying, PlaybackType, PlayingItem},
        users::UserProfile,
    },
    ErrorDetail, SpotifyApiError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::common::{whole_seconds, Token, User};
use crate::server::error::ServerError;
use crate::server::services::{
    AuthorizationProvider, Authorized, RegistryData, RegistryError, RegistryStore, SpotifyApi,
};

/// The only authorization code [`FakeProvider`] accepts
pub const VALID_CODE: &str = "valid-code";

/// A token that is good for another hour
pub fn test_token() -> Token {
    Token {
        access_token: "test-access".to_string(),
        refresh_token: "test-refresh".to_string(),
        expires_at: whole_seconds(Utc::now() + ChronoDuration::hours(1)),
    }
}

pub fn expired_token() -> Token {
    Token {
        access_token: "expired-access".to_string(),
        refresh_token: "expired-refresh".to_string(),
        expires_at: whole_seconds(Utc::now() - ChronoDuration::minutes(5)),
    }
}

pub fn test_user(id: &str) -> User {
    User {
        id: id.to_string(),
        display_name: None,
        token: test_token(),
    }
}

/// A playing track as Spotify would report it
pub fn playing(uri: &str) -> CurrentlyPlaying {
    CurrentlyPlaying {
        item: Some(PlayingItem {
            uri: uri.to_string(),
        }),
        is_playing: true,
        currently_playing_type: PlaybackType::Track,
        progress_ms: Some(30_000),
        timestamp: Utc::now().timestamp_millis(),
    }
}

/// Registry storage that keeps the last saved snapshot in memory
pub struct MemoryRegistryStore {
    data: Mutex<RegistryData>,
    saves: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryRegistryStore {
    pub fn new(data: RegistryData) -> Self {
        Self {
            data: Mutex::new(data),
            saves: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The last saved snapshot
    pub fn stored(&self) -> RegistryData {
        self.data.lock().unwrap().clone()
    }

    /// Make every following save fail with an IO error
    pub fn fail_saves(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryRegistryStore {
    fn default() -> Self {
        Self::new(RegistryData::default())
    }
}

impl RegistryStore for MemoryRegistryStore {
    fn load(&self) -> Result<RegistryData, RegistryError> {
        Ok(self.stored())
    }

    fn save(&self, data: &RegistryData) -> Result<(), RegistryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RegistryError::Io(std::io::Error::other("disk full")));
        }
        *self.data.lock().unwrap() = data.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Authorization provider that never touches the network
pub struct FakeProvider {
    exchanges: AtomicUsize,
    refreshes: AtomicUsize,
    fail_refresh: AtomicBool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            exchanges: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
        }
    }

    /// Access token handed out for [`VALID_CODE`]
    pub fn issued_access_token() -> String {
        "issued-access".to_string()
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorizationProvider for FakeProvider {
    fn authorization_url(&self, state: &str) -> Result<String, ServerError> {
        Ok(format!(
            "https://accounts.example.com/authorize?client_id=test-client&response_type=code&state={}",
            state
        ))
    }

    async fn exchange_code(&self, code: &str) -> Result<Token, ServerError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if code != VALID_CODE {
            return Err(ServerError::TokenExchangeFailed("invalid_grant".to_string()));
        }
        Ok(Token {
            access_token: Self::issued_access_token(),
            refresh_token: "issued-refresh".to_string(),
            expires_at: whole_seconds(Utc::now() + ChronoDuration::hours(1)),
        })
    }

    async fn refresh_token(&self, token: &Token) -> Result<Token, ServerError> {
        let count = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ServerError::UpstreamAuthFailed(
                "Token refresh failed: invalid_grant".to_string(),
            ));
        }
        Ok(Token {
            access_token: format!("refreshed-access-{}", count),
            refresh_token: token.refresh_token.clone(),
            expires_at: whole_seconds(Utc::now() + ChronoDuration::hours(1)),
        })
    }
}

/// What [`FakeSpotify`] answers to currently-playing requests
#[derive(Debug, Clone)]
pub enum UpstreamReply {
    Playing(CurrentlyPlaying),
    /// `204 No Content`
    NothingPlaying,
    Status(u16),
    /// `200` with a body that isn't JSON
    Malformed,
}

/// Spotify stand-in with scripted replies and call counters
pub struct FakeSpotify {
    reply: Mutex<UpstreamReply>,
    profiles: Mutex<HashMap<String, UserProfile>>,
    delay: Mutex<Option<Duration>>,
    refresh_expired: AtomicBool,
    currently_playing_calls: AtomicUsize,
    current_user_calls: AtomicUsize,
}

impl FakeSpotify {
    pub fn new() -> Self {
        Self {
            reply: Mutex::new(UpstreamReply::NothingPlaying),
            profiles: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            refresh_expired: AtomicBool::new(false),
            currently_playing_calls: AtomicUsize::new(0),
            current_user_calls: AtomicUsize::new(0),
        }
    }

    pub fn reply_with(&self, reply: UpstreamReply) {
        *self.reply.lock().unwrap() = reply;
    }

    /// `GET /me` with `access_token` returns this profile; unknown tokens get a 401
    pub fn add_profile(&self, access_token: &str, id: &str, display_name: Option<&str>) {
        self.profiles.lock().unwrap().insert(
            access_token.to_string(),
            UserProfile {
                id: id.to_string(),
                display_name: display_name.map(str::to_string),
            },
        );
    }

    /// Hold every currently-playing reply for `delay`
    pub fn delay_replies(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Behave like the real transport and mint a new token for expired ones
    pub fn refresh_expired_tokens(&self, refresh: bool) {
        self.refresh_expired.store(refresh, Ordering::SeqCst);
    }

    pub fn currently_playing_count(&self) -> usize {
        self.currently_playing_calls.load(Ordering::SeqCst)
    }

    pub fn current_user_count(&self) -> usize {
        self.current_user_calls.load(Ordering::SeqCst)
    }

    fn refreshed(&self, token: &Token) -> Option<Token> {
        if !self.refresh_expired.load(Ordering::SeqCst) || !token.is_expired() {
            return None;
        }
        Some(Token {
            access_token: format!("{}-refreshed", token.access_token),
            refresh_token: token.refresh_token.clone(),
            expires_at: whole_seconds(Utc::now() + ChronoDuration::hours(1)),
        })
    }
}

impl Default for FakeSpotify {
    fn default() -> Self {
        Self::new()
    }
}

fn status_error(status: u16, message: &str) -> ServerError {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    ServerError::from(SpotifyApiError::Spotify(
        status,
        ErrorDetail {
            status: status.as_u16(),
            message: message.to_string(),
        },
    ))
}

#[async_trait]
impl SpotifyApi for FakeSpotify {
    async fn currently_playing(
        &self,
        token: &Token,
    ) -> Result<Authorized<Option<CurrentlyPlaying>>, ServerError> {
        self.currently_playing_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.reply.lock().unwrap().clone();
        let value = match reply {
            UpstreamReply::Playing(playing) => Some(playing),
            UpstreamReply::NothingPlaying => None,
            UpstreamReply::Status(status) => return Err(status_error(status, "scripted failure")),
            UpstreamReply::Malformed => {
                let err = serde_json::from_str::<CurrentlyPlaying>("<html>")
                    .expect_err("html is not json");
                return Err(ServerError::from(SpotifyApiError::Decode(err)));
            }
        };

        Ok(Authorized {
            value,
            refreshed: self.refreshed(token),
        })
    }

    async fn current_user(&self, token: &Token) -> Result<Authorized<UserProfile>, ServerError> {
        self.current_user_calls.fetch_add(1, Ordering::SeqCst);

        let profile = self.profiles.lock().unwrap().get(&token.access_token).cloned();
        match profile {
            Some(value) => Ok(Authorized {
                value,
                refreshed: self.refreshed(token),
            }),
            None => Err(status_error(401, "Invalid access token")),
        }
    }
}
