use reqwest::StatusCode;

/// Typed error for non-2xx API responses, carried inside `anyhow::Error` and
/// recovered by downcast where the status matters.
#[derive(Debug)]
pub enum ApiError {
    /// HTTP 401: the credential was missing, expired, or rejected.
    Unauthorized(String),
    /// Any other non-success status.
    Status { status: u16, body: String },
}

impl ApiError {
    /// Builds the error for a response status and body.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            ApiError::Unauthorized(body)
        } else {
            ApiError::Status {
                status: status.as_u16(),
                body,
            }
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiError::Unauthorized(_) => 401,
            ApiError::Status { status, .. } => *status,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthorized(body) => {
                write!(f, "Authentication required (HTTP 401): {}", body)
            }
            ApiError::Status { status, body } => {
                write!(f, "Request failed (HTTP {}): {}", status, body)
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// True when an error is an HTTP 401 from the API.
pub fn is_unauthorized(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<ApiError>(),
        Some(ApiError::Unauthorized(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classifies_401() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, "expired".to_string());
        assert!(matches!(err, ApiError::Unauthorized(_)));
        assert_eq!(err.status(), 401);
    }

    #[test]
    fn test_from_status_other() {
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, "bad".to_string());
        assert_eq!(err.status(), 400);
        assert!(err.to_string().contains("HTTP 400"));
    }

    #[test]
    fn test_is_unauthorized_downcast() {
        let err = anyhow::Error::from(ApiError::Unauthorized("expired".to_string()));
        assert!(is_unauthorized(&err));

        let err = anyhow::Error::from(ApiError::Status {
            status: 500,
            body: String::new(),
        });
        assert!(!is_unauthorized(&err));

        let err = anyhow::anyhow!("connection reset");
        assert!(!is_unauthorized(&err));
    }
}
