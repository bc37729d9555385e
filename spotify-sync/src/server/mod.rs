pub mod config;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::Configuration;
pub use error::ServerError;

use axum::{http::Method, routing::get, Router};
use cookies::CookieSettings;
use services::{AuthorizationProvider, Registry, SessionManager, SpotifyApi, TrackCache};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub sessions: Arc<SessionManager>,
    pub tracks: Arc<TrackCache>,
    pub cookies: CookieSettings,
}

impl AppState {
    pub fn new(
        registry: Arc<Registry>,
        provider: Arc<dyn AuthorizationProvider>,
        spotify: Arc<dyn SpotifyApi>,
        cookies: CookieSettings,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(
            provider,
            spotify.clone(),
            registry.clone(),
        ));
        let tracks = Arc::new(TrackCache::new(spotify, registry.clone()));

        Self {
            registry,
            sessions,
            tracks,
            cookies,
        }
    }
}

pub fn router(state: AppState) -> Router {
    // Any page may poll /currentTrack
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/", get(handlers::home))
        .route("/health", get(handlers::health_check))
        .route("/currentTrack", get(handlers::current_track))
        .route("/login", get(handlers::login))
        .route("/spotifyCallback", get(handlers::spotify_callback))
        .route("/permitSharer", get(handlers::permit_sharer))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
