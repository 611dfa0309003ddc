pub mod api;
pub mod app;
pub mod authz;
pub mod config;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod token;
pub mod util;
