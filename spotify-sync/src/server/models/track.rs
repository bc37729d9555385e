use chrono::{DateTime, Utc};
use serde::Serialize;
use spotify_web_api::endpoints::player::{CurrentlyPlaying, PlaybackType};
use std::time::Duration;
use tokio::time::Instant;

/// What a sharer is playing, as served by `GET /currentTrack`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentTrack {
    pub item: Option<Track>,
    pub is_playing: bool,
    pub currently_playing_type: PlaybackType,
    pub progress_ms: Option<u64>,
    /// Unix milliseconds, from Spotify
    pub timestamp: i64,
    /// Unix seconds, when we fetched this
    pub fetched: i64,
    #[serde(skip)]
    pub fetched_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    pub uri: String,
}

impl CurrentTrack {
    /// Build a record from an upstream answer; `None` is Spotify's "no content"
    pub fn from_upstream(
        playing: Option<CurrentlyPlaying>,
        fetched_at: Instant,
        fetched: DateTime<Utc>,
    ) -> Self {
        match playing {
            Some(playing) => Self {
                item: playing.item.map(|item| Track { uri: item.uri }),
                is_playing: playing.is_playing,
                currently_playing_type: playing.currently_playing_type,
                progress_ms: playing.progress_ms,
                timestamp: playing.timestamp,
                fetched: fetched.timestamp(),
                fetched_at,
            },
            None => Self {
                item: None,
                is_playing: false,
                currently_playing_type: PlaybackType::Unknown,
                progress_ms: None,
                timestamp: 0,
                fetched: fetched.timestamp(),
                fetched_at,
            },
        }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}
