//! OIDC session client
//!
//! Owns the in-memory token state for one logical user session and keeps the
//! durable token store in step with it. Every way into a session (restored
//! from storage, silent SSO, hosted login, credential login) ends in the same
//! `install` step, and every token change re-parses claims through
//! `claims::decode`.
//!
//! Concurrency:
//! - `initialize` collapses concurrent callers onto one shared future, so the
//!   provider sees at most one cold initialization at a time.
//! - `update_token` is serialized by a mutex; a caller that waited behind a
//!   refresh finds the new token already in place and returns it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::Shared;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use common::Secret;

use crate::claims::{self, Claims};
use crate::error::{Error, Result};
use crate::pkce::AuthorizationRequest;
use crate::provider::{CallbackParams, IdentityProvider, Navigator};
use crate::store::{self, BoxFuture, CALLBACK_KEY_PREFIX, StoredTokens, TokenStore};
use crate::token::TokenResponse;
use crate::user::User;

type PendingInit = Shared<BoxFuture<'static, Result<bool>>>;

/// An established session.
struct Session {
    access_token: Secret<String>,
    refresh_token: Secret<String>,
    id_token: Option<Secret<String>>,
    claims: Claims,
    /// Access token expiry, unix seconds
    expires_at: u64,
    /// Refresh token expiry when the refresh token is itself a JWT
    refresh_expires_at: Option<u64>,
}

impl Session {
    fn from_tokens(tokens: StoredTokens) -> Result<Self> {
        let claims = claims::decode(tokens.access.expose())?;
        let expires_at = claims.exp.unwrap_or(0);
        // Refresh token claims are advisory; an opaque refresh token is fine.
        let refresh_expires_at = claims::decode(tokens.refresh.expose())
            .ok()
            .and_then(|c| c.exp);
        Ok(Self {
            access_token: tokens.access,
            refresh_token: tokens.refresh,
            id_token: tokens.id,
            claims,
            expires_at,
            refresh_expires_at,
        })
    }

    fn to_stored(&self) -> StoredTokens {
        StoredTokens {
            access: self.access_token.clone(),
            refresh: self.refresh_token.clone(),
            id: self.id_token.clone(),
        }
    }

    /// Build from a token endpoint response. The response's lifetimes are
    /// used where the tokens themselves carry no `exp`; a zero
    /// `refresh_expires_in` means the refresh token does not expire.
    fn from_response(response: TokenResponse) -> Result<Self> {
        let now = claims::now_secs();
        let expires_in = response.expires_in;
        let refresh_expires_in = response.refresh_expires_in;

        let mut session = Session::from_tokens(StoredTokens {
            access: Secret::new(response.access_token),
            refresh: Secret::new(response.refresh_token),
            id: response.id_token.filter(|t| !t.is_empty()).map(Secret::new),
        })?;
        if session.claims.exp.is_none()
            && let Some(secs) = expires_in
        {
            session.expires_at = now.saturating_add(secs);
        }
        if session.refresh_expires_at.is_none() {
            session.refresh_expires_at = refresh_expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now.saturating_add(secs));
        }
        Ok(session)
    }
}

enum InitSlot {
    Done,
    Wait(PendingInit),
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    session: RwLock<Option<Session>>,
    initialized: AtomicBool,
    pending_init: std::sync::Mutex<Option<PendingInit>>,
    refresh_lock: Mutex<()>,
}

/// Handle to the session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl SessionClient {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                navigator,
                session: RwLock::new(None),
                initialized: AtomicBool::new(false),
                pending_init: std::sync::Mutex::new(None),
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.session.read().await.is_some()
    }

    /// Current access token, if a session exists.
    pub async fn token(&self) -> Option<Secret<String>> {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    /// Parsed claims of the current access token.
    pub async fn claims(&self) -> Option<Claims> {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.claims.clone())
    }

    /// Access token expiry (unix seconds).
    pub async fn expires_at(&self) -> Option<u64> {
        self.inner.session.read().await.as_ref().map(|s| s.expires_at)
    }

    /// Bring the session up: restore a durable session if one exists,
    /// otherwise ask the provider for an existing SSO session.
    ///
    /// Concurrent callers share one in-flight attempt and its outcome. A
    /// failed attempt clears the slot so a later call can try again.
    pub async fn initialize(&self) -> Result<bool> {
        let slot = {
            let mut pending = self
                .inner
                .pending_init
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.is_initialized() {
                InitSlot::Done
            } else if let Some(existing) = pending.as_ref() {
                InitSlot::Wait(existing.clone())
            } else {
                let this = self.clone();
                let attempt: BoxFuture<'static, Result<bool>> =
                    Box::pin(async move { this.cold_initialize().await });
                let shared = attempt.shared();
                *pending = Some(shared.clone());
                InitSlot::Wait(shared)
            }
        };

        let pending = match slot {
            InitSlot::Done => return Ok(self.is_authenticated().await),
            InitSlot::Wait(pending) => pending,
        };

        let outcome = pending.clone().await;

        let mut slot = self
            .inner
            .pending_init
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|p| p.ptr_eq(&pending)) {
            *slot = None;
        }
        outcome
    }

    async fn cold_initialize(&self) -> Result<bool> {
        let authenticated = match self.restore_from_store().await {
            Ok(true) => {
                info!("restored session from durable storage");
                true
            }
            Ok(false) => self.silent_sso().await?,
            Err(e) => {
                warn!(error = %e, "stored tokens are unusable, treating session as absent");
                self.silent_sso().await?
            }
        };
        self.inner.initialized.store(true, Ordering::Release);
        info!(authenticated, provider = self.inner.provider.id(), "session initialized");
        Ok(authenticated)
    }

    /// Load the durable session into memory without contacting the provider.
    ///
    /// `Ok(false)` when nothing is stored; `MalformedToken` when the stored
    /// access token cannot be parsed, in which case memory is left untouched.
    pub async fn restore_from_store(&self) -> Result<bool> {
        let Some(tokens) = store::load_tokens(self.inner.store.as_ref()).await else {
            return Ok(false);
        };
        let session = Session::from_tokens(tokens)?;
        *self.inner.session.write().await = Some(session);
        Ok(true)
    }

    async fn silent_sso(&self) -> Result<bool> {
        let request = AuthorizationRequest::new(Some("none"));
        let url = self.begin_authorization(&request).await?;

        let observed = match self.inner.navigator.silent_check(&url).await {
            Ok(observed) => observed,
            Err(e) => {
                self.discard_authorization(&request.state).await;
                return Err(e);
            }
        };

        match observed {
            Some(callback) if callback.code.is_some() => {
                self.complete_redirect_login(callback).await?;
                Ok(true)
            }
            other => {
                self.discard_authorization(&request.state).await;
                debug!(
                    error = other.as_ref().and_then(|c| c.error.as_deref()),
                    "silent SSO check found no provider session"
                );
                Ok(false)
            }
        }
    }

    /// Persist a pending authorization request and return its URL. Only the
    /// newest request is kept; earlier ones can no longer be completed.
    async fn begin_authorization(&self, request: &AuthorizationRequest) -> Result<String> {
        let url = self.inner.provider.authorization_url(request)?;
        let entry = serde_json::to_string(request)
            .map_err(|e| Error::Storage(format!("serializing authorization request: {e}")))?;
        store::clear_pending_authorizations(self.inner.store.as_ref()).await?;
        self.inner
            .store
            .set(&format!("{CALLBACK_KEY_PREFIX}{}", request.state), entry)
            .await?;
        Ok(url)
    }

    async fn discard_authorization(&self, state: &str) {
        let key = format!("{CALLBACK_KEY_PREFIX}{state}");
        if let Err(e) = self.inner.store.remove(&key).await {
            warn!(error = %e, "failed to discard pending authorization request");
        }
    }

    /// Hand the browser to the provider's hosted login page. The session is
    /// established later by `complete_redirect_login`.
    pub async fn login_with_redirect(&self) -> Result<()> {
        let request = AuthorizationRequest::new(None);
        let url = self.begin_authorization(&request).await?;
        info!("redirecting to hosted login");
        self.inner.navigator.redirect(&url).await
    }

    /// Finish a hosted login (or silent check) from the provider's callback.
    pub async fn complete_redirect_login(&self, callback: CallbackParams) -> Result<()> {
        let state = callback
            .state
            .ok_or_else(|| Error::InvalidCallback("missing state".into()))?;
        let key = format!("{CALLBACK_KEY_PREFIX}{state}");
        let entry = self
            .inner
            .store
            .get(&key)
            .await
            .ok_or_else(|| Error::InvalidCallback("unknown or already used state".into()))?;
        self.inner.store.remove(&key).await?;

        if let Some(error) = callback.error {
            let detail = callback.error_description.unwrap_or_default();
            record_login("redirect", "failure");
            return Err(Error::AuthenticationFailed(format!("{error} {detail}").trim().to_owned()));
        }
        let code = callback
            .code
            .ok_or_else(|| Error::InvalidCallback("missing code".into()))?;
        let request: AuthorizationRequest = serde_json::from_str(&entry)
            .map_err(|e| Error::InvalidCallback(format!("corrupt pending request: {e}")))?;

        let response = match self
            .inner
            .provider
            .exchange_code(&code, &request.verifier)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                record_login("redirect", "failure");
                return Err(e);
            }
        };

        if let Some(id_token) = response.id_token.as_deref()
            && let Ok(id_claims) = claims::decode(id_token)
            && id_claims.nonce.as_deref() != Some(request.nonce.as_str())
        {
            record_login("redirect", "failure");
            return Err(Error::AuthenticationFailed(
                "identity token nonce does not match the login request".into(),
            ));
        }

        self.install(Session::from_response(response)?).await?;
        record_login("redirect", "success");
        info!("redirect login completed");
        Ok(())
    }

    /// Direct credential login (resource-owner password grant).
    pub async fn login_with_credentials(
        &self,
        username: &str,
        password: &Secret<String>,
    ) -> Result<()> {
        let response = match self.inner.provider.password_grant(username, password).await {
            Ok(response) => response,
            Err(e) => {
                record_login("password", "failure");
                warn!(username, error = %e, "credential login rejected");
                return Err(match e {
                    Error::AuthenticationFailed(_) => e,
                    other => Error::AuthenticationFailed(other.to_string()),
                });
            }
        };

        let session = Session::from_response(response)
            .map_err(|e| Error::AuthenticationFailed(e.to_string()))?;
        self.install(session)
            .await
            .map_err(|e| Error::AuthenticationFailed(e.to_string()))?;
        record_login("password", "success");
        info!(username, "credential login succeeded");
        Ok(())
    }

    /// Persist and adopt a new session.
    async fn install(&self, session: Session) -> Result<()> {
        store::save_tokens(self.inner.store.as_ref(), &session.to_stored()).await?;
        *self.inner.session.write().await = Some(session);
        self.inner.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Drop the session from memory and durable storage without contacting
    /// the provider.
    pub async fn discard_session(&self) -> Result<()> {
        self.take_session().await.map(|_| ())
    }

    async fn take_session(&self) -> Result<Option<Session>> {
        let previous = self.inner.session.write().await.take();
        store::clear_tokens(self.inner.store.as_ref()).await?;
        Ok(previous)
    }

    /// Drop the session locally and durably, then send the browser to the
    /// provider's logout endpoint.
    pub async fn logout(&self) -> Result<()> {
        let previous = self.take_session().await?;

        let hint = previous.as_ref().and_then(|s| s.id_token.as_ref());
        let url = self
            .inner
            .provider
            .logout_url(hint.map(|t| t.expose().as_str()))?;
        info!("session cleared, redirecting to provider logout");
        self.inner.navigator.redirect(&url).await
    }

    /// Return an access token valid for at least `min_validity`, refreshing
    /// it first if needed.
    ///
    /// `RefreshFailed` means the refresh token is expired or rejected and the
    /// session cannot continue. Transport errors come back as `Http` and
    /// leave the session intact.
    pub async fn update_token(&self, min_validity: Duration) -> Result<Secret<String>> {
        let _refreshing = self.inner.refresh_lock.lock().await;
        let now = claims::now_secs();

        let refresh = {
            let session = self.inner.session.read().await;
            let Some(session) = session.as_ref() else {
                return Err(Error::RefreshFailed("no active session".into()));
            };
            if session.expires_at > now.saturating_add(min_validity.as_secs()) {
                return Ok(session.access_token.clone());
            }
            if let Some(refresh_exp) = session.refresh_expires_at
                && refresh_exp <= now
            {
                record_refresh("expired");
                return Err(Error::RefreshFailed("refresh token expired".into()));
            }
            session.refresh_token.clone()
        };

        debug!("access token expiring, refreshing");
        let response = match self.inner.provider.refresh_grant(&refresh).await {
            Ok(response) => response,
            Err(e) => {
                record_refresh("failure");
                warn!(error = %e, "token refresh failed");
                return Err(e);
            }
        };

        let mut session = Session::from_response(response)?;
        if session.id_token.is_none() {
            session.id_token = self
                .inner
                .session
                .read()
                .await
                .as_ref()
                .and_then(|s| s.id_token.clone());
        }
        let token = session.access_token.clone();
        store::save_tokens(self.inner.store.as_ref(), &session.to_stored()).await?;
        *self.inner.session.write().await = Some(session);

        record_refresh("success");
        info!("token refreshed");
        Ok(token)
    }

    /// Whether the current access token carries realm role `role`
    /// (case-normalized).
    pub async fn has_role(&self, role: &str) -> bool {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .is_some_and(|s| s.claims.has_realm_role(role))
    }

    /// Fetch the signed-in user's profile from the provider.
    pub async fn load_user_profile(&self) -> Result<User> {
        let token = self
            .token()
            .await
            .ok_or_else(|| Error::ProfileLoadFailed("no active session".into()))?;
        let profile = self.inner.provider.load_user_profile(&token).await?;
        Ok(User::from_profile(profile))
    }
}

fn record_login(method: &'static str, outcome: &'static str) {
    metrics::counter!("auth_logins_total", "method" => method, "outcome" => outcome).increment(1);
}

fn record_refresh(outcome: &'static str) {
    metrics::counter!("auth_token_refreshes_total", "outcome" => outcome).increment(1);
}
