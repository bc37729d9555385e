use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect},
};

use crate::server::{cookies, error::ServerError, AppState};

/// Start the Spotify authorization code flow
#[tracing::instrument(name = "login", skip_all)]
pub async fn login(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let redirect = state.sessions.begin_login().inspect_err(ServerError::log)?;

    let mut headers = HeaderMap::new();
    cookies::append(
        &mut headers,
        [cookies::state_cookie(&redirect.state, state.cookies)],
    )
    .inspect_err(ServerError::log)?;

    tracing::info!("Redirecting to Spotify for authorization");

    Ok((headers, Redirect::to(&redirect.authorization_url)))
}
