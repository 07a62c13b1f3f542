//! pkgauth REST API
//!
//! This crate exposes the authentication plugin over HTTP so a package
//! registry can delegate login, registration, and package access checks.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, MetricsHandle};
