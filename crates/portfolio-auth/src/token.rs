//! Token endpoint and account endpoint calls
//!
//! Three grants POST form-encoded bodies to the realm's token endpoint:
//! 1. `password` (direct credential login)
//! 2. `authorization_code` (completion of a hosted login or silent SSO check)
//! 3. `refresh_token` (keeping the access token fresh)
//!
//! Status handling differs per grant: a rejected login is
//! `AuthenticationFailed`, a rejected refresh is `RefreshFailed`, and
//! transport failures are `Http` so callers can apply their own retry policy.

use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;

use common::Secret;

use crate::error::{Error, Result};
use crate::oidc::OidcConfig;
use crate::user::AccountProfile;

/// Token endpoint response shared by all grants.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    /// Seconds until the access token expires
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Seconds until the refresh token expires
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .finish()
    }
}

/// OAuth error body (`{"error": "...", "error_description": "..."}`).
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Resource-owner password grant.
pub async fn password_grant(
    client: &reqwest::Client,
    config: &OidcConfig,
    username: &str,
    password: &Secret<String>,
) -> Result<TokenResponse> {
    let response = client
        .post(config.token_endpoint())
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("grant_type", "password"),
            ("username", username),
            ("password", password.expose().as_str()),
            ("scope", crate::oidc::SCOPES),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("password grant request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::AuthenticationFailed(describe(status, &body)));
    }

    parse_tokens(response).await
}

/// Exchange an authorization code (plus its PKCE verifier) for tokens.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &OidcConfig,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(config.token_endpoint())
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", config.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("code exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::AuthenticationFailed(describe(status, &body)));
    }

    parse_tokens(response).await
}

/// Exchange a refresh token for a new token pair.
pub async fn refresh_grant(
    client: &reqwest::Client,
    config: &OidcConfig,
    refresh: &Secret<String>,
) -> Result<TokenResponse> {
    let response = client
        .post(config.token_endpoint())
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh.expose().as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();

        // Keycloak answers 400 invalid_grant for an expired or revoked
        // refresh token; 401/403 mean the client or session is gone.
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(Error::RefreshFailed(describe(status, &body)));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {}",
            describe(status, &body)
        )));
    }

    parse_tokens(response).await
}

/// Load the signed-in user's profile from the account endpoint.
pub async fn fetch_account(
    client: &reqwest::Client,
    config: &OidcConfig,
    access: &Secret<String>,
) -> Result<AccountProfile> {
    let response = client
        .get(config.account_endpoint())
        .bearer_auth(access.expose())
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| Error::ProfileLoadFailed(format!("account request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::ProfileLoadFailed(describe(status, &body)));
    }

    response
        .json::<AccountProfile>()
        .await
        .map_err(|e| Error::ProfileLoadFailed(format!("invalid account response: {e}")))
}

async fn parse_tokens(response: reqwest::Response) -> Result<TokenResponse> {
    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}

/// Render a non-2xx provider response, preferring the OAuth error fields.
fn describe(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ProviderErrorBody>(body) {
        Ok(ProviderErrorBody {
            error_description: Some(description),
            ..
        }) => format!("{status}: {description}"),
        Ok(ProviderErrorBody {
            error: Some(error), ..
        }) => format!("{status}: {error}"),
        _ if body.is_empty() => status.to_string(),
        _ => format!("{status}: {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Form;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    /// Start a stand-in Keycloak realm "test" on an ephemeral port.
    async fn start_keycloak() -> (OidcConfig, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = OidcConfig::new(format!("http://{addr}"), "test", "portfolio-frontend");

        let handle = tokio::spawn(async move {
            let app = Router::new()
                .route(
                    "/realms/test/protocol/openid-connect/token",
                    post(token_handler),
                )
                .route("/realms/test/account", get(account_handler));
            axum::serve(listener, app).await.unwrap();
        });

        (config, handle)
    }

    fn issued() -> serde_json::Value {
        serde_json::json!({
            "access_token": "at_alice",
            "refresh_token": "rt_alice",
            "id_token": "id_alice",
            "expires_in": 300,
            "refresh_expires_in": 1800,
            "token_type": "Bearer"
        })
    }

    async fn token_handler(
        Form(form): Form<HashMap<String, String>>,
    ) -> (axum::http::StatusCode, Json<serde_json::Value>) {
        use axum::http::StatusCode;
        if form.get("client_id").map(String::as_str) != Some("portfolio-frontend") {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "invalid_client"})),
            );
        }
        let field = |name: &str| form.get(name).map(String::as_str).unwrap_or_default();
        match field("grant_type") {
            "password" if field("username") == "alice" && field("password") == "secret" => {
                (StatusCode::OK, Json(issued()))
            }
            "password" => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "invalid_grant",
                    "error_description": "Invalid user credentials"
                })),
            ),
            "refresh_token" if field("refresh_token") == "rt_alice" => {
                (StatusCode::OK, Json(issued()))
            }
            "refresh_token" if field("refresh_token") == "rt_unavailable" => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": "temporarily_unavailable"})),
            ),
            "refresh_token" => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "invalid_grant",
                    "error_description": "Token is not active"
                })),
            ),
            "authorization_code"
                if field("code") == "good-code" && !field("code_verifier").is_empty() =>
            {
                (StatusCode::OK, Json(issued()))
            }
            _ => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "invalid_grant"})),
            ),
        }
    }

    async fn account_handler(headers: HeaderMap) -> axum::response::Response {
        use axum::response::IntoResponse;
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer at_alice");
        if !authorized {
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
        Json(serde_json::json!({
            "id": "5b1c",
            "username": "alice",
            "email": "alice@example.com",
            "firstName": "Alice",
            "lastName": "Liddell"
        }))
        .into_response()
    }

    #[test]
    fn token_response_tolerates_missing_optional_fields() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","refresh_token":"r"}"#).unwrap();
        assert!(token.id_token.is_none());
        assert!(token.expires_in.is_none());
    }

    #[test]
    fn token_response_debug_is_redacted() {
        let token: TokenResponse = serde_json::from_value(issued()).unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("at_alice"), "got: {debug}");
        assert!(!debug.contains("rt_alice"), "got: {debug}");
    }

    #[test]
    fn describe_prefers_error_description() {
        let msg = describe(
            StatusCode::UNAUTHORIZED,
            r#"{"error":"invalid_grant","error_description":"Invalid user credentials"}"#,
        );
        assert_eq!(msg, "401 Unauthorized: Invalid user credentials");
        assert_eq!(describe(StatusCode::BAD_GATEWAY, ""), "502 Bad Gateway");
        assert_eq!(
            describe(StatusCode::BAD_REQUEST, "plain text"),
            "400 Bad Request: plain text"
        );
    }

    #[tokio::test]
    async fn password_grant_returns_tokens() {
        let (config, _server) = start_keycloak().await;
        let client = reqwest::Client::new();
        let tokens = password_grant(&client, &config, "alice", &Secret::from("secret"))
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at_alice");
        assert_eq!(tokens.refresh_token, "rt_alice");
        assert_eq!(tokens.id_token.as_deref(), Some("id_alice"));
        assert_eq!(tokens.expires_in, Some(300));
    }

    #[tokio::test]
    async fn password_grant_rejects_bad_credentials() {
        let (config, _server) = start_keycloak().await;
        let client = reqwest::Client::new();
        let err = password_grant(&client, &config, "alice", &Secret::from("wrong"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::AuthenticationFailed("401 Unauthorized: Invalid user credentials".into())
        );
    }

    #[tokio::test]
    async fn refresh_grant_maps_invalid_grant_to_refresh_failed() {
        let (config, _server) = start_keycloak().await;
        let client = reqwest::Client::new();

        let ok = refresh_grant(&client, &config, &Secret::from("rt_alice")).await;
        assert_eq!(ok.unwrap().access_token, "at_alice");

        let expired = refresh_grant(&client, &config, &Secret::from("rt_expired")).await;
        assert!(
            matches!(expired, Err(Error::RefreshFailed(ref m)) if m.contains("Token is not active")),
            "got: {expired:?}"
        );
    }

    #[tokio::test]
    async fn refresh_grant_server_error_is_not_a_hard_failure() {
        let (config, _server) = start_keycloak().await;
        let client = reqwest::Client::new();
        let result = refresh_grant(&client, &config, &Secret::from("rt_unavailable")).await;
        assert!(matches!(result, Err(Error::TokenExchange(_))), "got: {result:?}");
    }

    #[tokio::test]
    async fn unreachable_provider_is_http_error() {
        // Bind and drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = OidcConfig::new(format!("http://{addr}"), "test", "portfolio-frontend");
        let result =
            refresh_grant(&reqwest::Client::new(), &config, &Secret::from("rt_alice")).await;
        assert!(matches!(result, Err(Error::Http(_))), "got: {result:?}");
    }

    #[tokio::test]
    async fn exchange_code_requires_known_code() {
        let (config, _server) = start_keycloak().await;
        let client = reqwest::Client::new();
        assert!(exchange_code(&client, &config, "good-code", "verifier").await.is_ok());
        let err = exchange_code(&client, &config, "stale-code", "verifier")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn fetch_account_uses_bearer_token() {
        let (config, _server) = start_keycloak().await;
        let client = reqwest::Client::new();

        let profile = fetch_account(&client, &config, &Secret::from("at_alice"))
            .await
            .unwrap();
        assert_eq!(profile.username.as_deref(), Some("alice"));
        assert_eq!(profile.first_name.as_deref(), Some("Alice"));

        let err = fetch_account(&client, &config, &Secret::from("at_other"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProfileLoadFailed(_)), "got: {err:?}");
    }
}
