use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Server error: {0}")]
    Server(StatusCode),

    /// A later login, logout or revalidation was issued before this one
    /// finished; its result was discarded.
    #[error("Superseded by a newer session operation")]
    Superseded,
}

impl AuthError {
    /// Map a non-success status from the login endpoint.
    pub(crate) fn from_login_status(status: StatusCode) -> Self {
        if status.is_client_error() {
            AuthError::InvalidCredentials
        } else {
            AuthError::Server(status)
        }
    }
}
