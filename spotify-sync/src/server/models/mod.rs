mod requests;
mod track;

pub use requests::{CallbackParams, CurrentTrackParams, HealthResponse, PermitSharerParams};
pub use track::{CurrentTrack, Track};
