//! Client-held credentials.
//!
//! The server keeps no session store: the login state value and the OAuth
//! tokens live in cookies on the client. Cookie values are untrusted input
//! and are only ever parsed, never interpreted as proof of identity without
//! a round trip to Spotify.

use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use chrono::DateTime;
use cookie::{time::Duration, Cookie, CookieBuilder, SameSite};

use crate::common::Token;
use crate::server::error::ServerError;

pub const STATE_COOKIE: &str = "state";
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const EXPIRY_COOKIE: &str = "expiry";
pub const NEXT_SYNC_USER_COOKIE: &str = "nextSyncUser";

/// How long a login may take between `/login` and the callback
pub const STATE_COOKIE_TTL: Duration = Duration::minutes(10);

#[derive(Debug, Clone, Copy, Default)]
pub struct CookieSettings {
    pub secure: bool,
}

/// Read a cookie from the request, ignoring empty values
pub fn get(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_string())
}

/// Rebuild a token from the `access_token`, `refresh_token` and `expiry` cookies
pub fn token_from_cookies(headers: &HeaderMap) -> Option<Token> {
    let access_token = get(headers, ACCESS_TOKEN_COOKIE)?;
    let refresh_token = get(headers, REFRESH_TOKEN_COOKIE)?;
    let expiry = get(headers, EXPIRY_COOKIE)?;

    let Some(expires_at) = expiry
        .parse::<i64>()
        .ok()
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
    else {
        tracing::debug!(expiry = %expiry, "Failed to parse token expiry cookie");
        return None;
    };

    Some(Token {
        access_token,
        refresh_token,
        expires_at,
    })
}

pub fn state_cookie(state: &str, settings: CookieSettings) -> Cookie<'static> {
    base(STATE_COOKIE, state.to_string(), settings)
        .max_age(STATE_COOKIE_TTL)
        .build()
}

pub fn token_cookies(token: &Token, settings: CookieSettings) -> Vec<Cookie<'static>> {
    vec![
        base(ACCESS_TOKEN_COOKIE, token.access_token.clone(), settings).build(),
        base(REFRESH_TOKEN_COOKIE, token.refresh_token.clone(), settings).build(),
        base(
            EXPIRY_COOKIE,
            token.expires_at.timestamp().to_string(),
            settings,
        )
        .build(),
    ]
}

pub fn removal(name: &'static str, settings: CookieSettings) -> Cookie<'static> {
    let mut cookie = base(name, String::new(), settings).build();
    cookie.make_removal();
    cookie
}

/// Append one `Set-Cookie` header per cookie
pub fn append<I>(headers: &mut HeaderMap, cookies: I) -> Result<(), ServerError>
where
    I: IntoIterator<Item = Cookie<'static>>,
{
    for cookie in cookies {
        let value = HeaderValue::from_str(&cookie.to_string()).map_err(|e| {
            ServerError::Internal(format!("invalid cookie '{}': {}", cookie.name(), e))
        })?;
        headers.append(SET_COOKIE, value);
    }
    Ok(())
}

fn base(name: &'static str, value: String, settings: CookieSettings) -> CookieBuilder<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure)
}
