//! Data models
//!
//! Records persisted in the record store, serialized as camelCase JSON.

pub mod auth;
pub mod booking;
pub mod car;
pub mod payment_intent;
pub mod promo;
