//! Business logic services for the Retail Stock Management Platform

pub mod allocation;
pub mod batch;
pub mod receiving;
pub mod sample;

pub use allocation::AllocationService;
pub use batch::BatchService;
pub use receiving::ReceivingService;
pub use sample::SampleService;
