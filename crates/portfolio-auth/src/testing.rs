//! Test doubles for the provider and navigator seams
//!
//! Tokens minted here are unsigned JWT-shaped strings; the client never
//! verifies signatures, so they exercise the same claims path as real ones.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;

use common::Secret;

use crate::claims::{self, now_secs};
use crate::error::{Error, Result};
use crate::oidc::OidcConfig;
use crate::pkce::{self, AuthorizationRequest};
use crate::provider::{CallbackParams, IdentityProvider, Navigator};
use crate::store::BoxFuture;
use crate::token::TokenResponse;
use crate::user::AccountProfile;

/// Code the stub provider accepts for its SSO user.
pub const SSO_CODE: &str = "sso-code";

const ACCESS_LIFETIME_SECS: i64 = 300;
const REFRESH_LIFETIME_SECS: i64 = 1800;

/// Build an unsigned token around `payload`.
pub fn unsigned_token(payload: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.sig")
}

fn expiry(expires_in: i64) -> u64 {
    (now_secs() as i64).saturating_add(expires_in).max(0) as u64
}

/// Access token for `username` with realm `roles`, expiring `expires_in`
/// seconds from now (negative for an already-expired token).
pub fn access_token(username: &str, roles: &[&str], expires_in: i64) -> String {
    unsigned_token(json!({
        "sub": format!("{username}-id"),
        "exp": expiry(expires_in),
        "iat": now_secs(),
        "typ": "Bearer",
        "preferred_username": username,
        "email": format!("{username}@example.com"),
        "realm_access": { "roles": roles },
    }))
}

/// Refresh token carrying enough claims for the stub to re-issue access.
pub fn refresh_token(username: &str, roles: &[&str], expires_in: i64) -> String {
    unsigned_token(json!({
        "exp": expiry(expires_in),
        "typ": "Refresh",
        "preferred_username": username,
        "realm_access": { "roles": roles },
    }))
}

fn id_token(username: &str, nonce: Option<&str>) -> String {
    unsigned_token(json!({
        "exp": expiry(ACCESS_LIFETIME_SECS),
        "typ": "ID",
        "preferred_username": username,
        "nonce": nonce,
    }))
}

fn issue(username: &str, roles: &[String], nonce: Option<&str>) -> TokenResponse {
    let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
    TokenResponse {
        access_token: access_token(username, &roles, ACCESS_LIFETIME_SECS),
        refresh_token: refresh_token(username, &roles, REFRESH_LIFETIME_SECS),
        id_token: Some(id_token(username, nonce)),
        expires_in: Some(ACCESS_LIFETIME_SECS as u64),
        refresh_expires_in: Some(REFRESH_LIFETIME_SECS as u64),
    }
}

struct StubUser {
    password: String,
    roles: Vec<String>,
}

/// In-process identity provider.
#[derive(Default)]
pub struct StubProvider {
    users: HashMap<String, StubUser>,
    sso_user: Option<(String, Vec<String>)>,
    last_nonce: Mutex<Option<String>>,
    reject_refresh: AtomicBool,
    unreachable: AtomicBool,
    fail_profile: AtomicBool,
    delay: Option<Duration>,
    password_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    code_exchanges: AtomicUsize,
}

fn owned_roles(roles: &[&str]) -> Vec<String> {
    roles.iter().map(|r| (*r).to_owned()).collect()
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: &str, password: &str, roles: &[&str]) -> Self {
        self.users.insert(
            username.to_owned(),
            StubUser {
                password: password.to_owned(),
                roles: owned_roles(roles),
            },
        );
        self
    }

    /// User who already holds a provider-side session; `SSO_CODE` logs them in.
    pub fn with_sso_user(mut self, username: &str, roles: &[&str]) -> Self {
        self.sso_user = Some((username.to_owned(), owned_roles(roles)));
        self
    }

    /// Refresh grants answer with `RefreshFailed`.
    pub fn rejecting_refresh(self) -> Self {
        self.reject_refresh.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_reject_refresh(&self, reject: bool) {
        self.reject_refresh.store(reject, Ordering::SeqCst);
    }

    /// Refresh grants fail with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn failing_profile(self) -> Self {
        self.fail_profile.store(true, Ordering::SeqCst);
        self
    }

    /// Slow down refresh grants so concurrent callers overlap.
    pub fn with_delay(mut self) -> Self {
        self.delay = Some(Duration::from_millis(50));
        self
    }

    pub fn password_calls(&self) -> usize {
        self.password_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn code_exchanges(&self) -> usize {
        self.code_exchanges.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for StubProvider {
    fn id(&self) -> &str {
        "stub"
    }

    fn password_grant<'a>(
        &'a self,
        username: &'a str,
        password: &'a Secret<String>,
    ) -> BoxFuture<'a, Result<TokenResponse>> {
        Box::pin(async move {
            self.password_calls.fetch_add(1, Ordering::SeqCst);
            match self.users.get(username) {
                Some(user) if user.password == *password.expose() => {
                    Ok(issue(username, &user.roles, None))
                }
                _ => Err(Error::AuthenticationFailed(
                    "401 Unauthorized: Invalid user credentials".into(),
                )),
            }
        })
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        _verifier: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse>> {
        Box::pin(async move {
            self.code_exchanges.fetch_add(1, Ordering::SeqCst);
            let nonce = self
                .last_nonce
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone();
            match &self.sso_user {
                Some((username, roles)) if code == SSO_CODE => {
                    Ok(issue(username, roles, nonce.as_deref()))
                }
                _ => Err(Error::AuthenticationFailed(
                    "400 Bad Request: Code not valid".into(),
                )),
            }
        })
    }

    fn refresh_grant<'a>(
        &'a self,
        refresh: &'a Secret<String>,
    ) -> BoxFuture<'a, Result<TokenResponse>> {
        Box::pin(async move {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.unreachable.load(Ordering::SeqCst) {
                return Err(Error::Http("connection refused".into()));
            }
            if self.reject_refresh.load(Ordering::SeqCst) {
                return Err(Error::RefreshFailed(
                    "400 Bad Request: Token is not active".into(),
                ));
            }
            let claims = claims::decode(refresh.expose())
                .map_err(|e| Error::RefreshFailed(e.to_string()))?;
            let username = claims.preferred_username.unwrap_or_default();
            Ok(issue(&username, &claims.realm_access.roles, None))
        })
    }

    fn load_user_profile<'a>(
        &'a self,
        access: &'a Secret<String>,
    ) -> BoxFuture<'a, Result<AccountProfile>> {
        Box::pin(async move {
            if self.fail_profile.load(Ordering::SeqCst) {
                return Err(Error::ProfileLoadFailed("503 Service Unavailable".into()));
            }
            let claims = claims::decode(access.expose())
                .map_err(|e| Error::ProfileLoadFailed(e.to_string()))?;
            Ok(AccountProfile {
                id: claims.sub,
                username: claims.preferred_username,
                email: claims.email,
                first_name: claims.given_name,
                last_name: claims.family_name,
            })
        })
    }

    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<String> {
        *self
            .last_nonce
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(request.nonce.clone());
        pkce::build_authorization_url(&OidcConfig::default(), request)
    }

    fn logout_url(&self, id_token_hint: Option<&str>) -> Result<String> {
        let hint = if id_token_hint.is_some() { "yes" } else { "no" };
        Ok(format!("logout:hint={hint}"))
    }
}

/// Navigator that records redirects and answers silent checks.
#[derive(Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<String>>,
    silent_checks: AtomicUsize,
    provider_session: bool,
    fail_silent_check: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Silent checks come back with `SSO_CODE` instead of `login_required`.
    pub fn with_provider_session(mut self) -> Self {
        self.provider_session = true;
        self
    }

    pub fn failing_silent_check(self) -> Self {
        self.fail_silent_check.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_silent_check_failure(&self, fail: bool) {
        self.fail_silent_check.store(fail, Ordering::SeqCst);
    }

    /// Slow down silent checks so concurrent initializations overlap.
    pub fn with_delay(mut self) -> Self {
        self.delay = Some(Duration::from_millis(50));
        self
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn silent_checks(&self) -> usize {
        self.silent_checks.load(Ordering::SeqCst)
    }

    /// The `state` parameter of an authorization URL.
    pub fn state_of(url: &str) -> Option<String> {
        let parsed = reqwest::Url::parse(url).ok()?;
        parsed
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
    }
}

impl Navigator for RecordingNavigator {
    fn redirect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.redirects
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(url.to_owned());
            Ok(())
        })
    }

    fn silent_check<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Option<CallbackParams>>> {
        Box::pin(async move {
            self.silent_checks.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_silent_check.load(Ordering::SeqCst) {
                return Err(Error::Navigation("silent check frame failed to load".into()));
            }
            let state = Self::state_of(url);
            Ok(Some(if self.provider_session {
                CallbackParams {
                    code: Some(SSO_CODE.into()),
                    state,
                    ..CallbackParams::default()
                }
            } else {
                CallbackParams {
                    state,
                    error: Some("login_required".into()),
                    ..CallbackParams::default()
                }
            }))
        })
    }
}
