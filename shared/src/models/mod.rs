//! Domain models for the Retail Stock Management Platform

mod batch;
mod order;
mod party;
mod product;
mod receipt;

pub use batch::*;
pub use order::*;
pub use party::*;
pub use product::*;
pub use receipt::*;
