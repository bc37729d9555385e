use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use oauth2::{
    basic::{BasicClient, BasicTokenResponse},
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, HttpRequest, HttpResponse,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};

use crate::common::{whole_seconds, Token};
use crate::server::config::OAuthConfiguration;
use crate::server::error::ServerError;

/// The provider side of the authorization code flow.
///
/// Implementations own the OAuth wire protocol; callers only see [`Token`]s.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// URL to send the user to, carrying `state` for CSRF protection
    fn authorization_url(&self, state: &str) -> Result<String, ServerError>;

    /// Exchange an authorization code. Failures are `TokenExchangeFailed`.
    async fn exchange_code(&self, code: &str) -> Result<Token, ServerError>;

    /// Refresh an expired token. Failures are `UpstreamAuthFailed`.
    async fn refresh_token(&self, token: &Token) -> Result<Token, ServerError>;
}

// Simple async HTTP client for OAuth2
async fn http_client(
    client: reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let mut builder = client
        .request(request.method().clone(), request.uri().to_string())
        .body(request.body().clone());

    for (name, value) in request.headers() {
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let response = builder.send().await?;
    let status = response.status();
    let body = response.bytes().await?.to_vec();

    let mut http_response = HttpResponse::new(body);
    *http_response.status_mut() = status;

    Ok(http_response)
}

pub struct OAuthClient {
    http: reqwest::Client,
    client_id: ClientId,
    client_secret: ClientSecret,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    scopes: Vec<Scope>,
}

impl OAuthClient {
    pub fn new(config: &OAuthConfiguration, timeout: Duration) -> Result<Self, ServerError> {
        // Token endpoints must not redirect, or the code could leak elsewhere
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        let auth_url = AuthUrl::new(config.auth_url.clone())
            .map_err(|e| ServerError::Configuration(format!("Invalid auth URL: {}", e)))?;

        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|e| ServerError::Configuration(format!("Invalid token URL: {}", e)))?;

        let redirect_url = RedirectUrl::new(config.redirect_uri.clone())
            .map_err(|e| ServerError::Configuration(format!("Invalid redirect URI: {}", e)))?;

        Ok(Self {
            http,
            client_id: ClientId::new(config.client_id.clone()),
            client_secret: config.client_secret.clone(),
            auth_url,
            token_url,
            redirect_url,
            scopes: config.scopes.iter().cloned().map(Scope::new).collect(),
        })
    }
}

#[async_trait]
impl AuthorizationProvider for OAuthClient {
    fn authorization_url(&self, state: &str) -> Result<String, ServerError> {
        let csrf_token = CsrfToken::new(state.to_string());
        let (auth_url, _) = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone())
            .authorize_url(|| csrf_token)
            .add_scopes(self.scopes.iter().cloned())
            .url();
        Ok(auth_url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<Token, ServerError> {
        let token_result = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone())
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&|request: HttpRequest| http_client(self.http.clone(), request))
            .await
            .map_err(|e| ServerError::TokenExchangeFailed(e.to_string()))?;

        let token = into_token(&token_result, None).map_err(ServerError::TokenExchangeFailed)?;

        tracing::debug!(
            "Successfully exchanged code for tokens, expires_at: {}",
            token.expires_at
        );

        Ok(token)
    }

    async fn refresh_token(&self, token: &Token) -> Result<Token, ServerError> {
        let token_result = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone())
            .exchange_refresh_token(&RefreshToken::new(token.refresh_token.clone()))
            .request_async(&|request: HttpRequest| http_client(self.http.clone(), request))
            .await
            .map_err(|e| ServerError::UpstreamAuthFailed(format!("Token refresh failed: {}", e)))?;

        let refreshed = into_token(&token_result, Some(&token.refresh_token))
            .map_err(ServerError::UpstreamAuthFailed)?;

        tracing::debug!("Successfully refreshed tokens, expires_at: {}", refreshed.expires_at);

        Ok(refreshed)
    }
}

/// Spotify may omit the refresh token on refresh; the old one stays valid then
fn into_token(
    response: &BasicTokenResponse,
    previous_refresh_token: Option<&str>,
) -> Result<Token, String> {
    let access_token = response.access_token().secret().to_string();

    let refresh_token = response
        .refresh_token()
        .map(|token| token.secret().to_string())
        .or_else(|| previous_refresh_token.map(str::to_string))
        .ok_or_else(|| "No refresh token in response".to_string())?;

    let expires_in = response
        .expires_in()
        .ok_or_else(|| "No expiration time in response".to_string())?;

    Ok(Token {
        access_token,
        refresh_token,
        expires_at: whole_seconds(Utc::now() + expires_in),
    })
}
