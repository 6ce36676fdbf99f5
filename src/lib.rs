pub mod api;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod errors;
pub mod logging;
pub mod models;
pub mod providers;
pub mod rag;
pub mod tasks;

#[cfg(test)]
pub mod tests;

pub use config::AppConfig;
pub use errors::*;
