// Types shared by the server and its stores
pub mod common;

pub mod server;

// In-memory collaborators for tests
pub mod testing;

pub use common::{Token, User};
