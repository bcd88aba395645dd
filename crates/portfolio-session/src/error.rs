//! Backend API errors

use thiserror::Error;

/// Errors from calls through the request pipeline.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The backend answered 401. The login recovery path has already been
    /// triggered when this is returned.
    #[error("unauthorized")]
    Unauthorized,

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request failed: {0}")]
    Http(String),
}

/// Result alias for backend calls
pub type Result<T> = std::result::Result<T, ApiError>;
