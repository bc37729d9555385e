mod models;

pub use models::{whole_seconds, Token, User};
