use serde::{Deserialize, Serialize};

pub const CURRENT_USER: &str = "/me";

/// The subset of `GET /me` we rely on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable Spotify user id. Unlike `display_name` this never changes.
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}
