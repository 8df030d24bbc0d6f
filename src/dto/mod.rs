//! Request and response bodies
//!
//! Wire shapes for the HTTP layer. Domain records are serialized as-is; only
//! inputs and envelopes live here.

pub mod api_response;
pub mod booking_dto;
pub mod car_dto;
pub mod promo_dto;

pub use api_response::ApiResponse;
