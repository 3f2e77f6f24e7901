//! Shared types and models for the Retail Stock Management Platform
//!
//! This crate contains domain types shared between the backend services and
//! other components of the system.

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::*;
