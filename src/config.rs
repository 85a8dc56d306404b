use std::env;

/// Default API base URL when BLOG_API_URL is not set.
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// SimpleJWT token obtain pair endpoint.
const DEFAULT_TOKEN_OBTAIN_PATH: &str = "/api/v1/token/";

/// SimpleJWT token refresh endpoint.
const DEFAULT_TOKEN_REFRESH_PATH: &str = "/api/v1/token/refresh/";

/// dj-rest-auth style login endpoint, tried when the token obtain call fails.
pub const LOGIN_FALLBACK_PATH: &str = "/api/v1/rest-auth/login/";

/// Endpoint configuration for the blog API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub token_obtain_path: String,
    pub token_refresh_path: String,
}

impl ApiConfig {
    /// Builds a config from a base URL, stripping any trailing slash so that
    /// paths can be appended verbatim.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token_obtain_path: DEFAULT_TOKEN_OBTAIN_PATH.to_string(),
            token_refresh_path: DEFAULT_TOKEN_REFRESH_PATH.to_string(),
        }
    }

    /// Reads the configuration from the environment:
    /// BLOG_API_URL, BLOG_TOKEN_OBTAIN_PATH, BLOG_TOKEN_REFRESH_PATH.
    pub fn from_env() -> Self {
        let base = env::var("BLOG_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(&base);
        if let Ok(path) = env::var("BLOG_TOKEN_OBTAIN_PATH") {
            config.token_obtain_path = path;
        }
        if let Ok(path) = env::var("BLOG_TOKEN_REFRESH_PATH") {
            config.token_refresh_path = path;
        }
        config
    }

    /// Full URL for a path under the API base.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
