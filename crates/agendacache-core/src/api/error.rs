use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - session may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Conflict(String),

    #[error("Rejected request: {0}")]
    BadRequest(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// How callers are expected to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network unreachable, timeout, overloaded server. Fall back to cache.
    Transient,
    /// Expired or invalid session. Sign out.
    Authorization,
    /// Duplicate key, check constraint, permission refusal, malformed input.
    /// Tell the user.
    Constraint,
    Unknown,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error payload returned by the REST and auth endpoints.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, alias = "msg", alias = "error_description")]
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
        let code = parsed.as_ref().and_then(|b| b.code.clone()).unwrap_or_default();
        let message = parsed
            .and_then(|b| b.message)
            .unwrap_or_else(|| Self::truncate_body(body));

        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            // Postgres integrity constraint violations are class 23
            400 | 422 if code.starts_with("23") => ApiError::Conflict(message),
            400 | 422 => ApiError::BadRequest(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NetworkError(_) | ApiError::RateLimited | ApiError::ServerError(_) => {
                ErrorKind::Transient
            }
            ApiError::Unauthorized => ErrorKind::Authorization,
            // Row-level security refusals leave the session valid
            ApiError::AccessDenied(_) | ApiError::Conflict(_) | ApiError::BadRequest(_) => {
                ErrorKind::Constraint
            }
            ApiError::NotFound(_) | ApiError::InvalidResponse(_) => ErrorKind::Unknown,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Authorization
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_maps_taxonomy() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert_eq!(
            ApiError::from_status(StatusCode::FORBIDDEN, "rls").kind(),
            ErrorKind::Constraint
        );
        assert!(!ApiError::from_status(StatusCode::FORBIDDEN, "rls").is_unauthorized());
        assert_eq!(
            ApiError::from_status(StatusCode::CONFLICT, "{}").kind(),
            ErrorKind::Constraint
        );
        assert_eq!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "down").kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "").kind(),
            ErrorKind::Transient
        );
    }

    #[test]
    fn test_postgres_constraint_code_is_conflict() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#;
        match ApiError::from_status(StatusCode::BAD_REQUEST, body) {
            ApiError::Conflict(msg) => assert!(msg.contains("duplicate key")),
            other => panic!("expected conflict, got {:?}", other),
        }

        let body = r#"{"code":"PGRST100","message":"bad filter"}"#;
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST, body),
            ApiError::BadRequest(_)
        ));
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(2000);
        let msg = ApiError::truncate_body(&body);
        assert!(msg.len() < 600);
        assert!(msg.contains("2000 total bytes"));
    }
}
