use rand::{distr::Alphanumeric, Rng};
use std::sync::Arc;

use super::{AuthorizationProvider, Registration, Registry, SpotifyApi};
use crate::common::{Token, User};
use crate::server::error::ServerError;
use crate::server::models::CallbackParams;

/// Length of the login state value; 62^16 is plenty for a 10 minute window
pub const STATE_LENGTH: usize = 16;

/// Where to send the user to start a login, and the state to remember
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub state: String,
    pub authorization_url: String,
}

#[derive(Debug, Clone)]
pub struct CompletedLogin {
    pub token: Token,
    pub redirect_to: String,
}

#[derive(Debug, Clone)]
pub struct SharerPermit {
    pub sharer: String,
    /// `false` when the sharer was already on the allow-list
    pub newly_permitted: bool,
    /// Set when the requester's token had to be refreshed on the way
    pub refreshed: Option<Token>,
}

/// Drives the Spotify authorization code flow and sharer administration
pub struct SessionManager {
    provider: Arc<dyn AuthorizationProvider>,
    spotify: Arc<dyn SpotifyApi>,
    registry: Arc<Registry>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn AuthorizationProvider>,
        spotify: Arc<dyn SpotifyApi>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            provider,
            spotify,
            registry,
        }
    }

    pub fn begin_login(&self) -> Result<LoginRedirect, ServerError> {
        let state = generate_state();
        let authorization_url = self.provider.authorization_url(&state)?;
        Ok(LoginRedirect {
            state,
            authorization_url,
        })
    }

    /// Validate the provider callback and exchange its code for a token.
    ///
    /// The state check happens before any network call. Once the token is
    /// issued, failing to register the user is logged but does not fail the
    /// login.
    pub async fn complete_login(
        &self,
        params: &CallbackParams,
        stored_state: Option<&str>,
        next_sync_user: Option<&str>,
    ) -> Result<CompletedLogin, ServerError> {
        if let Some(error) = &params.error {
            return Err(ServerError::AuthorizationDenied(error.clone()));
        }

        let code = non_empty(params.code.as_deref()).ok_or(ServerError::MissingParameter("code"))?;
        let state =
            non_empty(params.state.as_deref()).ok_or(ServerError::MissingParameter("state"))?;
        let stored_state = stored_state.ok_or(ServerError::MissingStateCookie)?;

        if !constant_time_eq(state.as_bytes(), stored_state.as_bytes()) {
            return Err(ServerError::StateMismatch);
        }

        let token = self.provider.exchange_code(code).await?;
        tracing::info!("Exchanged authorization code for token");

        self.register_if_permitted(&token).await;

        let redirect_to = match non_empty(next_sync_user) {
            Some(user) => format!(
                "/sync?user={}",
                url::form_urlencoded::byte_serialize(user.as_bytes()).collect::<String>()
            ),
            None => "/".to_string(),
        };

        Ok(CompletedLogin { token, redirect_to })
    }

    /// Let an admin (identified by their token) allow `sharer` to register
    pub async fn authorize_sharer(
        &self,
        requester: Option<Token>,
        sharer: &str,
    ) -> Result<SharerPermit, ServerError> {
        let token = requester.ok_or(ServerError::Unauthenticated)?;

        let profile = self.spotify.current_user(&token).await?;
        if !self.registry.is_admin(&profile.value.id) {
            tracing::warn!(requester = %profile.value.id, sharer = %sharer, "Non-admin tried to permit a sharer");
            return Err(ServerError::Forbidden);
        }

        let newly_permitted = self.registry.permit_sharer(sharer)?;
        tracing::info!(
            requester = %profile.value.id,
            sharer = %sharer,
            newly_permitted,
            "Sharer permitted"
        );

        Ok(SharerPermit {
            sharer: sharer.to_string(),
            newly_permitted,
            refreshed: profile.refreshed,
        })
    }

    async fn register_if_permitted(&self, token: &Token) {
        let profile = match self.spotify.current_user(token).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch user profile after login");
                return;
            }
        };

        let user = User {
            id: profile.value.id,
            display_name: profile.value.display_name,
            token: profile.refreshed.unwrap_or_else(|| token.clone()),
        };
        let user_id = user.id.clone();

        match self.registry.register_user(user) {
            Ok(Registration::Registered) => {
                tracing::info!(user = %user_id, "Registered new sharer")
            }
            Ok(Registration::TokenUpdated) => {
                tracing::info!(user = %user_id, "Updated token for registered sharer")
            }
            Ok(Registration::NotPermitted) => {
                tracing::debug!(user = %user_id, "Logged in user is not a permitted sharer")
            }
            Err(e) => tracing::error!(user = %user_id, error = %e, "Failed to register sharer"),
        }
    }
}

/// Random alphanumeric state value for one login
pub fn generate_state() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::services::RegistryData;
    use crate::testing::{test_token, FakeProvider, FakeSpotify, MemoryRegistryStore, VALID_CODE};

    struct Harness {
        manager: SessionManager,
        provider: Arc<FakeProvider>,
        spotify: Arc<FakeSpotify>,
        registry: Arc<Registry>,
        store: Arc<MemoryRegistryStore>,
    }

    fn harness(data: RegistryData) -> Harness {
        let store = Arc::new(MemoryRegistryStore::new(data));
        let registry = Arc::new(Registry::load(store.clone()).unwrap());
        let provider = Arc::new(FakeProvider::new());
        let spotify = Arc::new(FakeSpotify::new());
        let manager = SessionManager::new(provider.clone(), spotify.clone(), registry.clone());
        Harness {
            manager,
            provider,
            spotify,
            registry,
            store,
        }
    }

    fn callback(code: Option<&str>, state: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(str::to_string),
            state: state.map(str::to_string),
            error: None,
        }
    }

    #[test]
    fn generated_state_is_sixteen_alphanumerics() {
        let state = generate_state();

        assert_eq!(state.len(), STATE_LENGTH);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(state, generate_state());
    }

    #[tokio::test]
    async fn login_round_trip_with_issued_state_succeeds() {
        let h = harness(RegistryData::default());

        let redirect = h.manager.begin_login().unwrap();
        assert!(redirect.authorization_url.contains(&redirect.state));

        let login = h
            .manager
            .complete_login(
                &callback(Some(VALID_CODE), Some(&redirect.state)),
                Some(&redirect.state),
                None,
            )
            .await
            .unwrap();

        assert_eq!(login.redirect_to, "/");
        assert_eq!(login.token.access_token, FakeProvider::issued_access_token());
        assert_eq!(h.provider.exchange_count(), 1);
    }

    #[tokio::test]
    async fn state_mismatch_is_rejected_before_exchange() {
        let h = harness(RegistryData::default());

        let result = h
            .manager
            .complete_login(&callback(Some(VALID_CODE), Some("xyz999")), Some("abc123"), None)
            .await;

        assert!(matches!(result, Err(ServerError::StateMismatch)));
        assert_eq!(h.provider.exchange_count(), 0);
    }

    #[tokio::test]
    async fn missing_parameters_and_cookie_are_rejected() {
        let h = harness(RegistryData::default());

        let no_code = h
            .manager
            .complete_login(&callback(None, Some("abc123")), Some("abc123"), None)
            .await;
        let no_state = h
            .manager
            .complete_login(&callback(Some(VALID_CODE), Some("")), Some("abc123"), None)
            .await;
        let no_cookie = h
            .manager
            .complete_login(&callback(Some(VALID_CODE), Some("abc123")), None, None)
            .await;

        assert!(matches!(no_code, Err(ServerError::MissingParameter("code"))));
        assert!(matches!(no_state, Err(ServerError::MissingParameter("state"))));
        assert!(matches!(no_cookie, Err(ServerError::MissingStateCookie)));
        assert_eq!(h.provider.exchange_count(), 0);
    }

    #[tokio::test]
    async fn provider_error_is_surfaced() {
        let h = harness(RegistryData::default());
        let params = CallbackParams {
            code: None,
            state: Some("abc123".to_string()),
            error: Some("access_denied".to_string()),
        };

        let result = h.manager.complete_login(&params, Some("abc123"), None).await;

        assert!(matches!(result, Err(ServerError::AuthorizationDenied(e)) if e == "access_denied"));
    }

    #[tokio::test]
    async fn failed_exchange_is_not_retried() {
        let h = harness(RegistryData::default());

        let result = h
            .manager
            .complete_login(&callback(Some("bogus"), Some("abc123")), Some("abc123"), None)
            .await;

        assert!(matches!(result, Err(ServerError::TokenExchangeFailed(_))));
        assert_eq!(h.provider.exchange_count(), 1);
    }

    #[tokio::test]
    async fn permitted_sharer_is_registered_on_login() {
        let h = harness(RegistryData {
            permitted_sharers: vec!["bob".to_string()],
            ..Default::default()
        });
        h.spotify
            .add_profile(&FakeProvider::issued_access_token(), "bob", Some("Bob"));

        h.manager
            .complete_login(&callback(Some(VALID_CODE), Some("abc123")), Some("abc123"), None)
            .await
            .unwrap();

        let bob = h.registry.user("bob").expect("bob should be registered");
        assert_eq!(bob.display_name.as_deref(), Some("Bob"));
        assert_eq!(bob.token.access_token, FakeProvider::issued_access_token());
        assert_eq!(h.store.save_count(), 1);
    }

    #[tokio::test]
    async fn unpermitted_user_logs_in_without_registering() {
        let h = harness(RegistryData::default());
        h.spotify
            .add_profile(&FakeProvider::issued_access_token(), "eve", None);

        let login = h
            .manager
            .complete_login(&callback(Some(VALID_CODE), Some("abc123")), Some("abc123"), None)
            .await;

        assert!(login.is_ok());
        assert!(h.registry.user("eve").is_none());
        assert_eq!(h.store.save_count(), 0);
    }

    #[tokio::test]
    async fn profile_failure_does_not_fail_login() {
        let h = harness(RegistryData::default());

        let login = h
            .manager
            .complete_login(&callback(Some(VALID_CODE), Some("abc123")), Some("abc123"), None)
            .await;

        assert!(login.is_ok());
    }

    #[tokio::test]
    async fn pending_sync_user_becomes_redirect_target() {
        let h = harness(RegistryData::default());

        let login = h
            .manager
            .complete_login(
                &callback(Some(VALID_CODE), Some("abc123")),
                Some("abc123"),
                Some("dj bob"),
            )
            .await
            .unwrap();

        assert_eq!(login.redirect_to, "/sync?user=dj+bob");
    }

    #[tokio::test]
    async fn authorize_sharer_requires_token() {
        let h = harness(RegistryData::default());

        let result = h.manager.authorize_sharer(None, "carol").await;

        assert!(matches!(result, Err(ServerError::Unauthenticated)));
    }

    #[tokio::test]
    async fn authorize_sharer_requires_admin() {
        let h = harness(RegistryData::default());
        h.spotify.add_profile(&test_token().access_token, "eve", None);

        let result = h.manager.authorize_sharer(Some(test_token()), "carol").await;

        assert!(matches!(result, Err(ServerError::Forbidden)));
        assert!(!h.registry.is_permitted_sharer("carol"));
    }

    #[tokio::test]
    async fn authorize_sharer_is_idempotent() {
        let h = harness(RegistryData {
            admins: vec!["root".to_string()],
            ..Default::default()
        });
        h.spotify.add_profile(&test_token().access_token, "root", None);

        let first = h
            .manager
            .authorize_sharer(Some(test_token()), "carol")
            .await
            .unwrap();
        let after_first = h.registry.snapshot();
        let second = h
            .manager
            .authorize_sharer(Some(test_token()), "carol")
            .await
            .unwrap();

        assert!(first.newly_permitted);
        assert!(!second.newly_permitted);
        assert_eq!(h.registry.snapshot(), after_first);
        assert_eq!(h.store.save_count(), 1);
    }
}
