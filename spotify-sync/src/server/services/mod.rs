pub mod oauth_client;
pub mod registry;
pub mod session_manager;
pub mod spotify;
pub mod track_cache;

pub use oauth_client::{AuthorizationProvider, OAuthClient};
pub use registry::{
    JsonFileStore, Registration, Registry, RegistryData, RegistryError, RegistryStore,
};
pub use session_manager::{CompletedLogin, LoginRedirect, SessionManager, SharerPermit};
pub use spotify::{Authorized, SpotifyApi, SpotifyService};
pub use track_cache::{TrackCache, CURRENT_TRACK_TTL};
