//! HTTP middleware: admin authentication and CORS.

pub mod auth;
pub mod cors;

pub use auth::admin_auth_middleware;
pub use cors::{cors_middleware, cors_middleware_with_origins};
