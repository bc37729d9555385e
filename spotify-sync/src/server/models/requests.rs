use serde::{Deserialize, Serialize};

// GET /currentTrack
#[derive(Debug, Deserialize)]
pub struct CurrentTrackParams {
    pub user: Option<String>,
}

// GET /spotifyCallback
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

// GET /permitSharer
#[derive(Debug, Deserialize)]
pub struct PermitSharerParams {
    pub sharer: Option<String>,
}

// Health check
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
