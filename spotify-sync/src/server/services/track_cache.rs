use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{Registry, SpotifyApi};
use crate::common::User;
use crate::server::error::ServerError;
use crate::server::models::CurrentTrack;

/// Refresh current track data only after 10 seconds
pub const CURRENT_TRACK_TTL: Duration = Duration::from_secs(10);

type Slot = Arc<Mutex<Option<CurrentTrack>>>;

/// Per-user cache in front of Spotify's currently-playing endpoint.
///
/// Each user has their own async lock. The freshness check, the upstream
/// call and the write all happen while holding it, so concurrent requests
/// for one user share a single upstream call and different users never
/// wait on each other. Failed fetches are never cached.
pub struct TrackCache {
    spotify: Arc<dyn SpotifyApi>,
    registry: Arc<Registry>,
    ttl: Duration,
    entries: DashMap<String, Slot>,
}

impl TrackCache {
    pub fn new(spotify: Arc<dyn SpotifyApi>, registry: Arc<Registry>) -> Self {
        Self::with_ttl(spotify, registry, CURRENT_TRACK_TTL)
    }

    pub fn with_ttl(spotify: Arc<dyn SpotifyApi>, registry: Arc<Registry>, ttl: Duration) -> Self {
        Self {
            spotify,
            registry,
            ttl,
            entries: DashMap::new(),
        }
    }

    pub async fn current_track(&self, user: &User) -> Result<CurrentTrack, ServerError> {
        // Clone the slot out so the map shard isn't locked across the await
        let slot = Arc::clone(&self.entries.entry(user.id.clone()).or_default());
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref().filter(|track| track.is_fresh(self.ttl)) {
            tracing::debug!(user = %user.id, "Current track served from cache");
            return Ok(cached.clone());
        }

        // A request that waited on the lock may hold a token refreshed meanwhile
        let token = self
            .registry
            .user(&user.id)
            .map(|registered| registered.token)
            .unwrap_or_else(|| user.token.clone());

        let playing = self.spotify.currently_playing(&token).await?;

        if let Some(refreshed) = playing.refreshed {
            if let Err(e) = self.registry.update_token(&user.id, refreshed) {
                tracing::error!(user = %user.id, error = %e, "Failed to persist refreshed token");
            }
        }

        let track = CurrentTrack::from_upstream(playing.value, Instant::now(), Utc::now());
        tracing::debug!(user = %user.id, is_playing = track.is_playing, "Current track fetched");

        *entry = Some(track.clone());
        Ok(track)
    }

    /// The cached record for `user_id`, fresh or not, without calling upstream
    pub async fn peek(&self, user_id: &str) -> Option<CurrentTrack> {
        let slot = self.entries.get(user_id).map(|slot| Arc::clone(&slot))?;
        let entry = slot.lock().await;
        entry.clone()
    }
}
