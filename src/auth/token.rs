use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Credential pair persisted between sessions. Key names match the layout
/// used by the persisted store: `accessToken` / `refreshToken`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Credentials {
    #[serde(rename = "accessToken")]
    pub access: String,
    #[serde(rename = "refreshToken", skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl Credentials {
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access: access.into(),
            refresh,
        }
    }

    /// Authorization header value for this pair's access token.
    pub fn auth_header(&self) -> String {
        auth_header_for(&self.access)
    }
}

/// Authorization header conventions, distinguished by token shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// JWT-shaped token (exactly two `.` separators): `Bearer <token>`.
    Bearer,
    /// Opaque token (e.g. DRF TokenAuthentication key): `Token <token>`.
    Token,
}

impl AuthScheme {
    /// Classifies a token by shape.
    pub fn for_token(token: &str) -> Self {
        if token.matches('.').count() == 2 {
            AuthScheme::Bearer
        } else {
            AuthScheme::Token
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            AuthScheme::Bearer => "Bearer",
            AuthScheme::Token => "Token",
        }
    }
}

/// Formats the authorization header value for a token.
pub fn auth_header_for(token: &str) -> String {
    format!("{} {}", AuthScheme::for_token(token).prefix(), token)
}

/// A recognized token payload returned by the auth endpoints. Servers spell
/// the fields differently depending on the auth backend, so this is an
/// explicit union of the shapes the client accepts rather than ad-hoc key
/// probing.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenPayload {
    /// `{access[, refresh]}` or `{access_token[, refresh_token]}`.
    Pair {
        access: String,
        refresh: Option<String>,
    },
    /// `{key}` or `{token}`: a single opaque credential.
    Single { token: String },
    /// A bare JSON string, treated as an access token.
    Bare { token: String },
    /// `{refresh}` or `{refresh_token}` with no access key: rotates the
    /// refresh token only.
    RefreshOnly { refresh: String },
}

impl TokenPayload {
    /// Parses a server response body into a recognized payload shape.
    /// Returns None for anything else; callers decide whether an
    /// unrecognized payload is fatal.
    ///
    /// Key precedence: access > key > token > access_token, and
    /// refresh > refresh_token.
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(TokenPayload::Bare { token: s.clone() }),
            Value::Object(map) => {
                let refresh = map
                    .get("refresh")
                    .or_else(|| map.get("refresh_token"))
                    .and_then(Value::as_str)
                    .map(str::to_string);

                if let Some(access) = map.get("access").and_then(Value::as_str) {
                    return Some(TokenPayload::Pair {
                        access: access.to_string(),
                        refresh,
                    });
                }
                if let Some(key) = map
                    .get("key")
                    .or_else(|| map.get("token"))
                    .and_then(Value::as_str)
                {
                    return Some(TokenPayload::Single {
                        token: key.to_string(),
                    });
                }
                if let Some(access) = map.get("access_token").and_then(Value::as_str) {
                    return Some(TokenPayload::Pair {
                        access: access.to_string(),
                        refresh,
                    });
                }
                refresh.map(|refresh| TokenPayload::RefreshOnly { refresh })
            }
            _ => None,
        }
    }

    /// The access token carried by this payload, if any.
    pub fn access(&self) -> Option<&str> {
        match self {
            TokenPayload::Pair { access, .. } => Some(access),
            TokenPayload::Single { token } | TokenPayload::Bare { token } => Some(token),
            TokenPayload::RefreshOnly { .. } => None,
        }
    }

    /// The refresh token carried by this payload, if any.
    pub fn refresh(&self) -> Option<&str> {
        match self {
            TokenPayload::Pair { refresh, .. } => refresh.as_deref(),
            TokenPayload::RefreshOnly { refresh } => Some(refresh),
            _ => None,
        }
    }
}
