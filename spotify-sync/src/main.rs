use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use spotify_sync::server::{
    self,
    config::{Configuration, LoggingConfiguration},
    cookies::CookieSettings,
    services::{
        AuthorizationProvider, JsonFileStore, OAuthClient, Registry, RegistryStore, SpotifyApi,
        SpotifyService,
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let configuration = Configuration::new()?;
    init_tracing(&configuration.logging);
    configuration.validate().map_err(anyhow::Error::msg)?;
    tracing::info!("Configuration loaded successfully");

    // Initialize services
    let store: Arc<dyn RegistryStore> = Arc::new(JsonFileStore::new(&configuration.registry.path));
    let registry = Arc::new(Registry::load(store)?);
    registry.ensure_admins(&configuration.registry.admins)?;

    let provider: Arc<dyn AuthorizationProvider> = Arc::new(OAuthClient::new(
        &configuration.oauth,
        configuration.server.upstream_timeout(),
    )?);
    let spotify: Arc<dyn SpotifyApi> = Arc::new(SpotifyService::new(
        &configuration.spotify,
        configuration.server.upstream_timeout(),
        provider.clone(),
    )?);

    let app_state = AppState::new(
        registry,
        provider,
        spotify,
        CookieSettings {
            secure: configuration.server.secure_cookies,
        },
    );

    // Build router
    let app = server::router(app_state);

    // Start server
    let addr = format!(
        "{}:{}",
        configuration.server.host, configuration.server.port
    );
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfiguration) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let subscriber = tracing_subscriber::registry().with(filter);

    if logging.json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
