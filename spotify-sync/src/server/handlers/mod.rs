mod callback;
mod current_track;
mod login;
mod permit_sharer;

pub use callback::spotify_callback;
pub use current_track::current_track;
pub use login::login;
pub use permit_sharer::permit_sharer;

use crate::server::models::HealthResponse;
use axum::Json;

pub async fn home() -> &'static str {
    "hello world"
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
