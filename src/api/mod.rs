//! Blog API surface: authentication and post/comment/like operations over
//! the authenticated HTTP client.

mod auth;
mod posts;
mod types;

pub use posts::{PostPage, PostQuery};
pub use types::{Category, Comment, NewPost, Post, Tag};

use anyhow::Result;
use reqwest::Client;
use std::sync::Arc;

use crate::auth::Session;
use crate::config::ApiConfig;
use crate::http::ApiClient;

const USER_AGENT: &str = concat!("blog-client/", env!("CARGO_PKG_VERSION"));

/// High-level client for the blog service. The composition root builds one
/// of these and shares the session with any other request-issuing parts.
pub struct BlogApi {
    http: ApiClient,
}

impl BlogApi {
    /// Builds the API client over a config and a shared session.
    pub fn new(config: ApiConfig, session: Arc<Session>) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http: ApiClient::new(client, config, session),
        })
    }

    /// Wraps an already-assembled HTTP client.
    pub fn from_client(http: ApiClient) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &ApiClient {
        &self.http
    }

    pub fn session(&self) -> &Arc<Session> {
        self.http.session()
    }
}
