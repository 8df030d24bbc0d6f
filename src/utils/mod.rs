//! Utilities
//!
//! Error handling, request validation, JWT verification and webhook
//! signatures.

pub mod errors;
pub mod jwt;
pub mod signature;
pub mod validation;
