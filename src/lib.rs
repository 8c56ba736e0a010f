pub mod audit;
pub mod auth;
pub mod config;
pub mod engagement;
pub mod error;
pub mod leaderboard;
pub mod media;
pub mod models;
pub mod moderation;
pub mod openapi;
pub mod quests;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod security;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
