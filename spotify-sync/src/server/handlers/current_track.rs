use axum::{
    extract::{Query, State},
    Json,
};

use crate::server::{
    error::ServerError,
    models::{CurrentTrack, CurrentTrackParams},
    AppState,
};

#[tracing::instrument(name = "current_track", skip_all, fields(user))]
pub async fn current_track(
    State(state): State<AppState>,
    Query(params): Query<CurrentTrackParams>,
) -> Result<Json<CurrentTrack>, ServerError> {
    let user_id = params
        .user
        .filter(|user| !user.is_empty())
        .ok_or(ServerError::MissingParameter("user"))?;
    tracing::Span::current().record("user", user_id.as_str());

    let user = state
        .registry
        .user(&user_id)
        .ok_or(ServerError::UserNotRegistered)
        .inspect_err(ServerError::log)?;

    let track = state
        .tracks
        .current_track(&user)
        .await
        .inspect_err(ServerError::log)?;

    Ok(Json(track))
}
