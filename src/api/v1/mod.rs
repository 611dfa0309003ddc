pub mod auth;
pub mod pack;
pub mod user;
