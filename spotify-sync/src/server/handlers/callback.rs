use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
};

use crate::server::{cookies, error::ServerError, models::CallbackParams, AppState};

/// Spotify redirects here after the user approves (or denies) access
#[tracing::instrument(name = "spotify_callback", skip_all)]
pub async fn spotify_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServerError> {
    let stored_state = cookies::get(&headers, cookies::STATE_COOKIE);
    let next_sync_user = cookies::get(&headers, cookies::NEXT_SYNC_USER_COOKIE);

    let login = state
        .sessions
        .complete_login(&params, stored_state.as_deref(), next_sync_user.as_deref())
        .await
        .inspect_err(ServerError::log)?;

    let mut response_cookies = cookies::token_cookies(&login.token, state.cookies);
    // The state value is single-use
    response_cookies.push(cookies::removal(cookies::STATE_COOKIE, state.cookies));
    if next_sync_user.is_some() {
        response_cookies.push(cookies::removal(
            cookies::NEXT_SYNC_USER_COOKIE,
            state.cookies,
        ));
    }

    let mut response_headers = HeaderMap::new();
    cookies::append(&mut response_headers, response_cookies).inspect_err(ServerError::log)?;

    tracing::info!(redirect_to = %login.redirect_to, "OAuth callback successful");

    Ok((response_headers, Redirect::to(&login.redirect_to)))
}
