pub mod player;
pub mod users;
