//! Re-exports of the shared domain models used by the backend services

pub use shared::models::*;
