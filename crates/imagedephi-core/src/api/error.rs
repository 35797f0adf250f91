use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not logged in or session expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error ({status}): {message}")]
    Server { status: StatusCode, message: String },

    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus { status: StatusCode, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A 2xx response whose body is not the expected document.
    #[error("Invalid response from {route}: {message}")]
    InvalidResponse { route: String, message: String },

    /// The request body could not be encoded; nothing was sent.
    #[error("Invalid request body for {route}: {message}")]
    InvalidRequest { route: String, message: String },
}

/// Maximum length for error messages taken from response bodies
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error document the server sends with non-2xx responses.
#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl ApiError {
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

    /// The server's `message` field when the body is an error document,
    /// otherwise the raw body.
    fn error_message(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => Self::truncate_body(&parsed.message),
            Err(_) => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = Self::error_message(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::UnexpectedStatus { status, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(ApiError::from_status(StatusCode::UNAUTHORIZED, ""), ApiError::Unauthorized));
        assert!(matches!(ApiError::from_status(StatusCode::FORBIDDEN, "no"), ApiError::AccessDenied(b) if b == "no"));
        assert!(matches!(ApiError::from_status(StatusCode::NOT_FOUND, ""), ApiError::NotFound(_)));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, ""),
            ApiError::Server { status, .. } if status == StatusCode::BAD_GATEWAY
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::UnexpectedStatus { status, .. } if status.as_u16() == 429
        ));
    }

    #[test]
    fn test_error_document_message_is_extracted() {
        let body = r#"{"message": "Invalid ObjectId: nope", "type": "rest"}"#;
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST, body),
            ApiError::UnexpectedStatus { message, .. } if message == "Invalid ObjectId: nope"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, "plain text"),
            ApiError::NotFound(m) if m == "plain text"
        ));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "é".repeat(400);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.ends_with("(truncated, 800 total bytes)"));
        assert!(ApiError::truncate_body("short") == "short");
    }
}
