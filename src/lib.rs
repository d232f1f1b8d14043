pub mod auth;
pub mod billing;
pub mod config;
pub mod error;
pub mod extractor;
pub mod packages;
pub mod reviews;
pub mod routes;
pub mod users;
pub mod webhooks;
