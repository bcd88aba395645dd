//! Error types for the session and token operations

/// Errors from authentication, token and session-storage operations.
///
/// Variants carry `String` context so the type stays `Clone`: concurrent
/// callers awaiting the same in-flight initialization all receive a copy of
/// the one outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Bad credentials or the provider rejected the login.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The refresh token is invalid or expired. Callers treat this as a hard
    /// logout signal.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("failed to load user profile: {0}")]
    ProfileLoadFailed(String),

    #[error("authentication initialization failed: {0}")]
    InitializationFailed(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("token storage error: {0}")]
    Storage(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("invalid login callback: {0}")]
    InvalidCallback(String),
}

pub type Result<T> = std::result::Result<T, Error>;
