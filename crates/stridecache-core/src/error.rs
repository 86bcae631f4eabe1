use thiserror::Error;

/// Error produced by a remote fetch or mutation.
///
/// Cloneable so a single failure can be fanned out to every subscriber of a
/// cache entry; transport errors are captured as their display text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rejected by server: {0}")]
    Validation(String),
}

/// How the cache reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Terminal; retrying cannot make a missing resource exist.
    NotFound,
    /// Network or server trouble; retried up to the resource's cap.
    Transient,
    /// Input rejected by the remote side; never retried.
    Validation,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl QueryError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            400 | 409 | 422 => QueryError::Validation(truncated),
            401 => QueryError::Unauthorized,
            403 => QueryError::AccessDenied(truncated),
            404 | 410 => QueryError::NotFound(truncated),
            429 => QueryError::RateLimited,
            500..=599 => QueryError::ServerError(truncated),
            _ => QueryError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            QueryError::NotFound(_) => ErrorClass::NotFound,
            QueryError::Validation(_) => ErrorClass::Validation,
            _ => ErrorClass::Transient,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            QueryError::InvalidResponse(err.to_string())
        } else {
            QueryError::NetworkError(err.to_string())
        }
    }
}

/// Error building a query key from loose parts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Resource {resource} takes {expected} parameter(s), got {got}")]
    Arity {
        resource: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Resource {0} is not paginated")]
    NotPaginated(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_classification() {
        assert!(matches!(
            QueryError::from_status(StatusCode::NOT_FOUND, "gone"),
            QueryError::NotFound(ref b) if b == "gone"
        ));
        assert_eq!(
            QueryError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "bad").class(),
            ErrorClass::Validation
        );
        assert_eq!(
            QueryError::from_status(StatusCode::BAD_GATEWAY, "").class(),
            ErrorClass::Transient
        );
        assert_eq!(
            QueryError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            QueryError::RateLimited
        );
        assert!(QueryError::from_status(StatusCode::GONE, "").is_not_found());
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "é".repeat(400); // 800 bytes, two per char
        let truncated = QueryError::truncate_body(&body);
        assert!(truncated.contains("truncated, 800 total bytes"));

        assert_eq!(QueryError::truncate_body("short"), "short");
    }
}
