//! Keycloak OIDC session library
//!
//! Owns the token lifecycle for one user session: restoring tokens from
//! durable storage, silent SSO, hosted (PKCE) and credential logins, proactive
//! refresh, role checks and logout. It has no knowledge of the application
//! state layered on top and can be tested on its own.
//!
//! Session flow:
//! 1. `SessionClient::initialize()` restores a stored session or runs a
//!    silent `prompt=none` check through the `Navigator`
//! 2. Logins go through `login_with_redirect()` + `complete_redirect_login()`
//!    or `login_with_credentials()`
//! 3. Every established session is persisted via `store::save_tokens()`
//! 4. Callers ask `update_token()` for a token valid for a margin; it
//!    refreshes under a lock when the token is about to expire
//! 5. `logout()` clears memory and storage, then redirects to the provider

pub mod claims;
pub mod error;
pub mod oidc;
pub mod pkce;
pub mod provider;
pub mod session;
pub mod store;
pub mod token;
pub mod user;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use claims::Claims;
pub use error::{Error, Result};
pub use oidc::{ADMIN_ROLE, OidcConfig};
pub use provider::{CallbackParams, IdentityProvider, KeycloakProvider, Navigator};
pub use session::SessionClient;
pub use store::{BoxFuture, FileTokenStore, MemoryTokenStore, TokenStore};
pub use user::User;
