//! REST API client module for the quota service.
//!
//! This module provides the `ApiClient` for communicating with the
//! backend's authentication and quota endpoints, and the `Authorization`
//! default that injects the session's bearer token into every request.

pub mod authorization;
pub mod client;
pub mod error;

pub use authorization::Authorization;
pub use client::{ApiClient, AuthResponse, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::ApiError;
