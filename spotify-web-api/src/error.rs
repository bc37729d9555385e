use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum SpotifyApiError {
    Spotify(StatusCode, ErrorDetail),
    Decode(serde_json::Error),
    Internal(reqwest::Error),
}

impl SpotifyApiError {
    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        // Spotify does not always send its error envelope (e.g. from the edge proxy)
        let detail = serde_json::from_str::<ErrorResponse>(body)
            .map(|response| response.error)
            .unwrap_or_else(|_| ErrorDetail {
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        SpotifyApiError::Spotify(status, detail)
    }

    /// HTTP status reported by Spotify, if the request got that far
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SpotifyApiError::Spotify(status, _) => Some(*status),
            SpotifyApiError::Internal(e) => e.status(),
            SpotifyApiError::Decode(_) => None,
        }
    }
}

impl From<reqwest::Error> for SpotifyApiError {
    fn from(value: reqwest::Error) -> Self {
        SpotifyApiError::Internal(value)
    }
}

impl std::fmt::Display for SpotifyApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpotifyApiError::Internal(e) => write!(f, "Internal error: {}", e),
            SpotifyApiError::Decode(e) => write!(f, "Decode error: {}", e),
            SpotifyApiError::Spotify(status, detail) => {
                write!(f, "({}) {}", status, detail.message)
            }
        }
    }
}

impl std::error::Error for SpotifyApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SpotifyApiError::Internal(e) => Some(e),
            SpotifyApiError::Decode(e) => Some(e),
            SpotifyApiError::Spotify(..) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub status: u16,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_response_parses_spotify_envelope() {
        let body = r#"{"error":{"status":401,"message":"The access token expired"}}"#;
        let err = SpotifyApiError::from_response(StatusCode::UNAUTHORIZED, body);

        match err {
            SpotifyApiError::Spotify(status, detail) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(detail.status, 401);
                assert_eq!(detail.message, "The access token expired");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn from_response_falls_back_to_raw_body() {
        let err = SpotifyApiError::from_response(StatusCode::BAD_GATEWAY, "upstream down\n");

        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(err.to_string(), "(502 Bad Gateway) upstream down");
    }
}
