//! Client library for the blog API: session-based authentication with
//! single-flight token refresh, post/comment/like operations, and cover
//! image upload to the media host.

pub mod api;
pub mod auth;
pub mod config;
pub mod http;
pub mod media;
