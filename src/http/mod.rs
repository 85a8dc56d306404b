//! Authenticated HTTP client module: request issuing, typed status errors,
//! and the single-replay recovery from expired access tokens.

mod client;
mod error;

pub use client::ApiClient;
pub use error::{ApiError, is_unauthorized};
