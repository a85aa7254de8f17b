pub mod auth;
pub mod bookmarks;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metadata;
pub mod models;
pub mod router;
pub mod state;
