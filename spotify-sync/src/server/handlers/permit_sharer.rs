use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
};

use crate::server::{cookies, error::ServerError, models::PermitSharerParams, AppState};

/// Admin-only: allow a Spotify user to register as a sharer
#[tracing::instrument(name = "permit_sharer", skip_all, fields(sharer))]
pub async fn permit_sharer(
    State(state): State<AppState>,
    Query(params): Query<PermitSharerParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServerError> {
    let sharer = params
        .sharer
        .map(|sharer| sharer.trim().to_string())
        .filter(|sharer| !sharer.is_empty())
        .ok_or(ServerError::MissingParameter("sharer"))?;
    tracing::Span::current().record("sharer", sharer.as_str());

    let requester = cookies::token_from_cookies(&headers);
    let permit = state
        .sessions
        .authorize_sharer(requester, &sharer)
        .await
        .inspect_err(ServerError::log)?;

    // Keep the browser's cookies in step with a token refreshed on the way
    let mut response_headers = HeaderMap::new();
    if let Some(token) = &permit.refreshed {
        cookies::append(
            &mut response_headers,
            cookies::token_cookies(token, state.cookies),
        )
        .inspect_err(ServerError::log)?;
    }

    let body = if permit.newly_permitted {
        format!("permitted {} to register as a sharer", permit.sharer)
    } else {
        format!("{} already permitted", permit.sharer)
    };

    Ok((response_headers, body))
}
