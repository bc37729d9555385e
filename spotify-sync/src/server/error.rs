use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use spotify_web_api::SpotifyApiError;
use thiserror::Error;

use crate::server::services::RegistryError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("missing query param '{0}'")]
    MissingParameter(&'static str),

    #[error("missing state cookie")]
    MissingStateCookie,

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("oauth state mismatch")]
    StateMismatch,

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("upstream authorization failed: {0}")]
    UpstreamAuthFailed(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("failed to decode upstream response: {0}")]
    DecodeError(String),

    #[error("must be logged in")]
    Unauthenticated,

    #[error("must be an admin")]
    Forbidden,

    #[error("user not registered")]
    UserNotRegistered,

    #[error("Persistence error: {0}")]
    Persistence(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::MissingParameter(_)
            | ServerError::MissingStateCookie
            | ServerError::AuthorizationDenied(_) => StatusCode::BAD_REQUEST,
            // Forbidden deliberately shares 401 with the other auth failures
            ServerError::StateMismatch | ServerError::Unauthenticated | ServerError::Forbidden => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::UserNotRegistered => StatusCode::NOT_FOUND,
            ServerError::TokenExchangeFailed(_)
            | ServerError::UpstreamAuthFailed(_)
            | ServerError::UpstreamError(_)
            | ServerError::DecodeError(_)
            | ServerError::Persistence(_)
            | ServerError::Configuration(_)
            | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log at a level matching who is at fault: callers get `warn`, we get `error`
    pub fn log(&self) {
        if self.status().is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Upstream and storage details stay in the logs
        let error_message = if status.is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<SpotifyApiError> for ServerError {
    fn from(err: SpotifyApiError) -> Self {
        match err {
            SpotifyApiError::Spotify(status, detail) if status == StatusCode::UNAUTHORIZED => {
                ServerError::UpstreamAuthFailed(detail.message)
            }
            SpotifyApiError::Spotify(..) => ServerError::UpstreamError(err.to_string()),
            SpotifyApiError::Decode(e) => ServerError::DecodeError(e.to_string()),
            SpotifyApiError::Internal(e) if e.is_decode() => ServerError::DecodeError(e.to_string()),
            SpotifyApiError::Internal(e) => ServerError::UpstreamError(e.to_string()),
        }
    }
}

impl From<config::ConfigError> for ServerError {
    fn from(err: config::ConfigError) -> Self {
        ServerError::Configuration(format!("Configuration error: {}", err))
    }
}
