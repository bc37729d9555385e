use serde::{Deserialize, Serialize};

pub const CURRENTLY_PLAYING: &str = "/me/player/currently-playing";

// Responses

/// Body of `GET /me/player/currently-playing`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentlyPlaying {
    /// `null` while an ad or an unavailable item is playing
    #[serde(default)]
    pub item: Option<PlayingItem>,
    pub is_playing: bool,
    #[serde(default)]
    pub currently_playing_type: PlaybackType,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    /// Unix milliseconds of the last playback state change
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayingItem {
    pub uri: String,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackType {
    Track,
    Episode,
    Ad,
    #[default]
    #[serde(other)]
    Unknown,
}
