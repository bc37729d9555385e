use oauth2::ClientSecret;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Configuration {
    #[serde(default)]
    pub server: ServerConfiguration,
    pub oauth: OAuthConfiguration,
    #[serde(default)]
    pub spotify: SpotifyConfiguration,
    #[serde(default)]
    pub registry: RegistryConfiguration,
    #[serde(default)]
    pub logging: LoggingConfiguration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfiguration {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Mark cookies `Secure`; enable when served over HTTPS
    #[serde(default)]
    pub secure_cookies: bool,

    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OAuthConfiguration {
    pub client_id: String,
    pub client_secret: ClientSecret,
    pub redirect_uri: String,

    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpotifyConfiguration {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfiguration {
    /// JSON file holding registered users and allow-lists
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,

    /// Spotify user ids that are always admins
    #[serde(default)]
    pub admins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfiguration {
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_upstream_timeout() -> u64 {
    10
}

fn default_auth_url() -> String {
    "https://accounts.spotify.com/authorize".to_string()
}

fn default_token_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "user-read-currently-playing".to_string(),
        "user-read-playback-state".to_string(),
    ]
}

fn default_api_base_url() -> String {
    spotify_web_api::BASE_URL.to_string()
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("registry.json")
}

impl Default for ServerConfiguration {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure_cookies: false,
            upstream_timeout_seconds: default_upstream_timeout(),
        }
    }
}

impl Default for SpotifyConfiguration {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
        }
    }
}

impl Default for RegistryConfiguration {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            admins: Vec::new(),
        }
    }
}

impl ServerConfiguration {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_seconds)
    }
}

impl Configuration {
    pub fn new() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("SPOTIFY_SYNC_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(
                config::Environment::with_prefix("SPOTIFY_SYNC")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(" ")
                    .with_list_parse_key("oauth.scopes")
                    .with_list_parse_key("registry.admins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.oauth.client_id.is_empty() {
            return Err("oauth.client_id is required".to_string());
        }
        if !self.oauth.redirect_uri.starts_with("http") {
            return Err("oauth.redirect_uri must be a valid HTTP(S) URL".to_string());
        }
        if self.oauth.scopes.is_empty() {
            return Err("oauth.scopes must not be empty".to_string());
        }
        Ok(())
    }
}
