//! PKCE (RFC 7636) and authorization request construction
//!
//! Redirect logins and silent SSO checks both start with an authorization
//! request carrying an S256 challenge, a random `state` to match the callback,
//! and a `nonce` echoed back inside the identity token.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::oidc::{OidcConfig, SCOPES};

/// Generate a random code verifier.
///
/// 64 random bytes encode to 86 base64url characters, inside the 43–128
/// character range Keycloak enforces.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// One pending authorization request. Persisted in the token store under a
/// state-scoped key until the provider calls back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub state: String,
    pub nonce: String,
    pub verifier: String,
    /// `Some("none")` for a silent SSO check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl AuthorizationRequest {
    pub fn new(prompt: Option<&str>) -> Self {
        Self {
            state: uuid::Uuid::new_v4().to_string(),
            nonce: uuid::Uuid::new_v4().to_string(),
            verifier: generate_verifier(),
            prompt: prompt.map(str::to_owned),
        }
    }
}

/// Build the provider's authorization URL for `request`.
pub fn build_authorization_url(config: &OidcConfig, request: &AuthorizationRequest) -> Result<String> {
    let challenge = compute_challenge(&request.verifier);
    let mut params = vec![
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("response_type", "code"),
        ("response_mode", "fragment"),
        ("scope", SCOPES),
        ("state", request.state.as_str()),
        ("nonce", request.nonce.as_str()),
        ("code_challenge", challenge.as_str()),
        ("code_challenge_method", "S256"),
    ];
    if let Some(prompt) = request.prompt.as_deref() {
        params.push(("prompt", prompt));
    }

    reqwest::Url::parse_with_params(&config.authorization_endpoint(), &params)
        .map(String::from)
        .map_err(|e| Error::Navigation(format!("invalid authorization endpoint: {e}")))
}
