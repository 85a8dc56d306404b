//! Authenticated HTTP layer over the blog API.
//!
//! Every request carries the session's current authorization header. A 401
//! triggers at most one token refresh (single-flight across concurrent
//! requests, see [`Session::refresh_with`]) followed by exactly one replay of
//! the original request; a second 401 after the replay is final. There is no
//! transport retry or backoff in this layer.

use anyhow::{Context, Result};
use log::debug;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::Session;
use crate::config::ApiConfig;

/// HTTP client wrapping reqwest with session-derived authorization and the
/// refresh-and-replay protocol for expired access tokens.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
    session: Arc<Session>,
}

impl ApiClient {
    pub fn new(client: Client, config: ApiConfig, session: Arc<Session>) -> Self {
        Self {
            client,
            config,
            session,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// GET a JSON resource.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_json(Method::GET, path, &[], None::<&Value>)
            .await
    }

    /// GET a JSON resource with query parameters.
    #[tracing::instrument(skip(self, query))]
    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        self.request_json(Method::GET, path, query, None::<&Value>)
            .await
    }

    /// POST a JSON body and parse the JSON response.
    #[tracing::instrument(skip(self, body))]
    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request_json(Method::POST, path, &[], Some(body)).await
    }

    /// DELETE a resource; the response body is discarded.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .execute(Method::DELETE, path, &[], None::<&Value>)
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, body).into());
        }
        Ok(())
    }

    async fn request_json<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.execute(method, path, query, body).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, body).into());
        }
        response
            .json::<T>()
            .await
            .context("Failed to parse JSON response")
    }

    /// Sends the request with the current session header. On a 401, runs the
    /// single-flight refresh and replays the request exactly once with the
    /// rotated header; the replay's outcome is returned as-is, so a second
    /// 401 surfaces without another refresh cycle. Refresh failure wipes the
    /// session and surfaces the original 401.
    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Response> {
        let url = self.config.url(path);
        let (header, generation) = self.session.auth_state().await;

        let response = self
            .send_once(&method, &url, query, body, header.as_deref())
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let original = ApiError::Unauthorized(response.text().await.unwrap_or_default());
        debug!("{} {} returned 401, attempting token refresh", method, path);

        let new_header = match self
            .session
            .refresh_with(generation, |refresh| self.refresh_call(refresh))
            .await
        {
            Ok(header) => header,
            Err(e) => {
                debug!("Recovery from 401 failed: {:#}", e);
                return Err(original.into());
            }
        };

        self.send_once(&method, &url, query, body, Some(&new_header))
            .await
    }

    async fn send_once<B: Serialize + ?Sized>(
        &self,
        method: &Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
        auth_header: Option<&str>,
    ) -> Result<Response> {
        let mut request = self.client.request(method.clone(), url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(header) = auth_header {
            request = request.header(AUTHORIZATION, header);
        }
        request.send().await.context("Failed to send request")
    }

    /// Exchanges the refresh token for a new access token. Sent without an
    /// authorization header.
    async fn refresh_call(&self, refresh_token: String) -> Result<Value> {
        let url = self.config.url(&self.config.token_refresh_path);
        debug!("POST {} (token refresh)", url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "refresh": refresh_token }))
            .send()
            .await
            .context("Failed to send token refresh request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, body).into());
        }
        response
            .json()
            .await
            .context("Failed to parse token refresh response")
    }
}
