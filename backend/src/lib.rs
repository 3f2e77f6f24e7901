//! Retail Stock Management Platform - backend library
//!
//! The inventory consistency and allocation core: batch ledger, stock
//! allocation, supplier receiving, and catalog aggregate updates. The HTTP
//! surface consuming these services lives in the enclosing application.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: std::sync::Arc<Config>,
}
