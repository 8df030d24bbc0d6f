//! Configuration
//!
//! Environment variables, record store and payment processor settings.

pub mod environment;
pub mod store;

pub use environment::*;
pub use store::StoreConfig;
