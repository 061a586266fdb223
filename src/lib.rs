pub mod config;
pub mod error;
pub mod extract;
pub mod football_api;
pub mod http_client;
pub mod loader;
pub mod records;
