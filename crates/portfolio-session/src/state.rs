//! Application auth state
//!
//! `AuthStore` is the observable view of the session that the rest of the
//! application reads: who is signed in, whether they are an admin, the
//! current bearer token and whether initialization has finished. It drives
//! the `SessionClient` and publishes every change on a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use common::Secret;
use portfolio_auth::store::{self, TokenStore};
use portfolio_auth::{ADMIN_ROLE, CallbackParams, Error, Result, SessionClient, User, claims};

use crate::phase::{AuthEvent, AuthPhase, transition};

/// Margin `refresh_token` asks the session client to guarantee.
pub const MIN_TOKEN_VALIDITY: Duration = Duration::from_secs(5);

const REFRESH_FAILED_MESSAGE: &str = "Token refresh failed";

/// Point-in-time copy of the auth state.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSnapshot {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_admin: bool,
    #[serde(skip)]
    pub token: Option<Secret<String>>,
    pub loading: bool,
    pub error: Option<String>,
    pub initialized: bool,
    pub phase: AuthPhase,
}

impl AuthSnapshot {
    /// Adopt `token`, deriving the admin flag from its claims so the two
    /// never disagree.
    fn set_authenticated(&mut self, token: Secret<String>) {
        self.is_admin = claims::decode(token.expose())
            .map(|c| c.has_realm_role(ADMIN_ROLE))
            .unwrap_or(false);
        self.is_authenticated = true;
        self.token = Some(token);
    }

    fn clear(&mut self) {
        self.user = None;
        self.is_authenticated = false;
        self.is_admin = false;
        self.token = None;
    }

    fn apply(&mut self, event: AuthEvent) {
        self.phase = transition(self.phase, event);
    }
}

pub struct AuthStore {
    session: SessionClient,
    store: Arc<dyn TokenStore>,
    state: watch::Sender<AuthSnapshot>,
    init_lock: Mutex<()>,
}

impl AuthStore {
    pub fn new(session: SessionClient, store: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(AuthSnapshot::default());
        Self {
            session,
            store,
            state,
            init_lock: Mutex::new(()),
        }
    }

    pub fn session(&self) -> &SessionClient {
        &self.session
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.borrow().initialized
    }

    /// Establish the auth state. Runs once; later calls return immediately
    /// and concurrent calls wait for the first.
    ///
    /// Failures are recorded in `error` and never leave the store
    /// uninitialized.
    pub async fn initialize(&self) {
        let _init = self.init_lock.lock().await;
        if self.is_initialized() {
            return;
        }

        self.state.send_modify(|s| {
            s.loading = true;
            s.apply(AuthEvent::InitStarted);
        });

        let outcome = self.run_initialize().await;

        self.state.send_modify(|s| {
            match &outcome {
                Ok(()) if s.is_authenticated => s.apply(AuthEvent::SessionEstablished),
                Ok(()) => s.apply(AuthEvent::NoSession),
                Err(e) => {
                    s.error = Some(Error::InitializationFailed(e.to_string()).to_string());
                    s.apply(AuthEvent::InitFailed);
                }
            }
            s.loading = false;
            s.initialized = true;
        });

        match outcome {
            Ok(()) => info!(
                authenticated = self.state.borrow().is_authenticated,
                "auth state initialized"
            ),
            Err(e) => warn!(error = %e, "auth initialization failed"),
        }
    }

    async fn run_initialize(&self) -> Result<()> {
        let has_stored = store::has_stored_tokens(self.store.as_ref()).await;

        let authenticated = if self.session.is_initialized() {
            self.session.is_authenticated().await
        } else {
            self.session.initialize().await?
        };

        if authenticated {
            self.adopt_session().await
        } else if has_stored {
            self.rehydrate().await
        } else {
            Ok(())
        }
    }

    /// The session client holds a session. Trust it only as far as the
    /// access token's expiry: a token near expiry must survive a refresh.
    async fn adopt_session(&self) -> Result<()> {
        match self.session.update_token(MIN_TOKEN_VALIDITY).await {
            Ok(token) => {
                self.state.send_modify(|s| s.set_authenticated(token));
                self.load_user_profile(None).await;
                Ok(())
            }
            Err(Error::RefreshFailed(reason)) => {
                info!(%reason, "stored session could not be refreshed, logging out");
                self.logout().await
            }
            Err(e) => Err(e),
        }
    }

    /// Durable tokens exist but the session client did not accept them.
    /// Show the stored identity provisionally, then require a refresh.
    async fn rehydrate(&self) -> Result<()> {
        debug!("restoring session from stored tokens");
        match self.session.restore_from_store().await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                warn!(error = %e, "stored session is unusable, logging out");
                return self.logout().await;
            }
        }

        if let Some(token) = self.session.token().await {
            self.state.send_modify(|s| s.set_authenticated(token));
        }

        match self.session.update_token(MIN_TOKEN_VALIDITY).await {
            Ok(token) => {
                self.state.send_modify(|s| s.set_authenticated(token));
                self.load_user_profile(None).await;
                Ok(())
            }
            Err(Error::RefreshFailed(reason)) => {
                info!(%reason, "stored session could not be refreshed, logging out");
                self.logout().await
            }
            Err(e) => {
                // Storage stays as is so a later run can retry.
                self.state.send_modify(|s| s.clear());
                Err(e)
            }
        }
    }

    /// Fetch the profile into `user`. On failure fall back to a minimal
    /// user named `fallback`, or the token's username.
    async fn load_user_profile(&self, fallback: Option<&str>) {
        let user = match self.session.load_user_profile().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "failed to load user profile");
                let claimed = self
                    .session
                    .claims()
                    .await
                    .and_then(|c| c.preferred_username);
                match fallback.map(str::to_owned).or(claimed) {
                    Some(username) => User::minimal(&username),
                    None => return,
                }
            }
        };
        self.state.send_modify(|s| s.user = Some(user));
    }

    /// Start a hosted login. Local state changes once the callback is
    /// completed with `complete_login`.
    pub async fn login(&self) -> Result<()> {
        self.session.login_with_redirect().await
    }

    /// Finish a hosted login from the provider's callback.
    pub async fn complete_login(&self, callback: CallbackParams) -> Result<()> {
        if let Err(e) = self.session.complete_redirect_login(callback).await {
            self.state.send_modify(|s| s.error = Some(e.to_string()));
            return Err(e);
        }
        self.establish(None).await;
        Ok(())
    }

    pub async fn login_with_credentials(
        &self,
        username: &str,
        password: &Secret<String>,
    ) -> Result<()> {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let outcome = self.session.login_with_credentials(username, password).await;
        match outcome {
            Ok(()) => {
                self.establish(Some(username)).await;
                self.state.send_modify(|s| s.loading = false);
                let admin = self.state.borrow().is_admin;
                info!(username, admin, "user authenticated");
                Ok(())
            }
            Err(e) => {
                self.state.send_modify(|s| {
                    s.error = Some(e.to_string());
                    s.loading = false;
                });
                Err(e)
            }
        }
    }

    async fn establish(&self, fallback_username: Option<&str>) {
        if let Some(token) = self.session.token().await {
            self.state.send_modify(|s| {
                s.set_authenticated(token);
                s.initialized = true;
                s.apply(AuthEvent::SessionEstablished);
            });
        }
        self.load_user_profile(fallback_username).await;
    }

    /// Clear local state, then end the session with the provider. Observers
    /// see the cleared state before the provider call starts.
    pub async fn logout(&self) -> Result<()> {
        self.state.send_modify(|s| {
            s.clear();
            s.apply(AuthEvent::LogoutRequested);
        });
        let outcome = self.session.logout().await;
        self.state.send_modify(|s| s.apply(AuthEvent::LogoutCompleted));
        outcome
    }

    /// Token valid for at least `MIN_TOKEN_VALIDITY`. On failure records the
    /// error, starts a hosted login as the recovery path and returns `None`.
    ///
    /// `RefreshFailed` ends the session first: local state, the session
    /// client and durable storage are all cleared. Other failures leave the
    /// session in place.
    pub async fn refresh_token(&self) -> Option<Secret<String>> {
        match self.session.update_token(MIN_TOKEN_VALIDITY).await {
            Ok(token) => {
                let unchanged = self.state.borrow().token.as_ref() == Some(&token);
                if !unchanged {
                    let fresh = token.clone();
                    self.state.send_modify(|s| s.set_authenticated(fresh));
                }
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                if matches!(e, Error::RefreshFailed(_)) {
                    self.end_session().await;
                }
                self.state
                    .send_modify(|s| s.error = Some(REFRESH_FAILED_MESSAGE.to_owned()));
                if let Err(e) = self.login().await {
                    warn!(error = %e, "failed to start login after refresh failure");
                }
                None
            }
        }
    }

    /// Local logout without the provider round trip.
    async fn end_session(&self) {
        self.state.send_modify(|s| {
            s.clear();
            s.apply(AuthEvent::LogoutRequested);
        });
        if let Err(e) = self.session.discard_session().await {
            warn!(error = %e, "failed to clear stored session");
        }
        self.state.send_modify(|s| s.apply(AuthEvent::LogoutCompleted));
    }
}
