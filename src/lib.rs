pub mod accounts;
pub mod auth;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod multipart;
pub mod openapi;
pub mod password;
pub mod posts;
pub mod repo;
pub mod routes;
pub mod security;
pub mod storage;

// Re-export commonly used items for tests / external users
pub use config::AppConfig;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
