//! Seams between the session client and the outside world
//!
//! `IdentityProvider` covers the provider's HTTP endpoints; `Navigator`
//! covers everything that needs a browser (hosted login, logout redirect,
//! the hidden silent-SSO navigation). Both use boxed futures so they can be
//! held as `Arc<dyn ...>` and swapped for stubs in tests.

use common::Secret;
use tracing::debug;

use crate::error::{Error, Result};
use crate::oidc::OidcConfig;
use crate::pkce::{self, AuthorizationRequest};
use crate::store::BoxFuture;
use crate::token::{self, TokenResponse};
use crate::user::AccountProfile;

/// Parameters the provider appends to `redirect_uri` when it calls back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a callback URL. Parameters may sit in the fragment
    /// (`response_mode=fragment`) or the query string; fragment wins.
    pub fn from_url(url: &str) -> Result<Self> {
        let mut parsed = reqwest::Url::parse(url)
            .map_err(|e| Error::InvalidCallback(format!("not a URL: {e}")))?;

        let mut params = Self::default();
        params.absorb(&parsed);

        if let Some(fragment) = parsed.fragment().map(str::to_owned) {
            parsed.set_query(Some(&fragment));
            params.absorb(&parsed);
        }
        Ok(params)
    }

    fn absorb(&mut self, url: &reqwest::Url) {
        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut self.code,
                "state" => &mut self.state,
                "error" => &mut self.error,
                "error_description" => &mut self.error_description,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
    }
}

/// The OIDC provider's network endpoints.
pub trait IdentityProvider: Send + Sync {
    /// Identifier for logging (e.g. "keycloak")
    fn id(&self) -> &str;

    fn password_grant<'a>(
        &'a self,
        username: &'a str,
        password: &'a Secret<String>,
    ) -> BoxFuture<'a, Result<TokenResponse>>;

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse>>;

    fn refresh_grant<'a>(&'a self, refresh: &'a Secret<String>)
    -> BoxFuture<'a, Result<TokenResponse>>;

    fn load_user_profile<'a>(
        &'a self,
        access: &'a Secret<String>,
    ) -> BoxFuture<'a, Result<AccountProfile>>;

    /// URL of the hosted login page (or silent check when
    /// `request.prompt` is `none`).
    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<String>;

    /// URL that ends the provider-side session.
    fn logout_url(&self, id_token_hint: Option<&str>) -> Result<String>;
}

/// Browser-side effects.
pub trait Navigator: Send + Sync {
    /// Send the user agent to `url` (hosted login, provider logout).
    fn redirect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Perform a hidden navigation to a `prompt=none` authorization URL and
    /// report what the provider called back with. `None` means no callback
    /// was observed (no browser, timeout).
    fn silent_check<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Option<CallbackParams>>>;
}

/// Keycloak over HTTP.
pub struct KeycloakProvider {
    config: OidcConfig,
    client: reqwest::Client,
}

impl KeycloakProvider {
    pub fn new(config: OidcConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }
}

impl IdentityProvider for KeycloakProvider {
    fn id(&self) -> &str {
        "keycloak"
    }

    fn password_grant<'a>(
        &'a self,
        username: &'a str,
        password: &'a Secret<String>,
    ) -> BoxFuture<'a, Result<TokenResponse>> {
        Box::pin(token::password_grant(
            &self.client,
            &self.config,
            username,
            password,
        ))
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse>> {
        Box::pin(token::exchange_code(
            &self.client,
            &self.config,
            code,
            verifier,
        ))
    }

    fn refresh_grant<'a>(
        &'a self,
        refresh: &'a Secret<String>,
    ) -> BoxFuture<'a, Result<TokenResponse>> {
        Box::pin(token::refresh_grant(&self.client, &self.config, refresh))
    }

    fn load_user_profile<'a>(
        &'a self,
        access: &'a Secret<String>,
    ) -> BoxFuture<'a, Result<AccountProfile>> {
        Box::pin(token::fetch_account(&self.client, &self.config, access))
    }

    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<String> {
        pkce::build_authorization_url(&self.config, request)
    }

    fn logout_url(&self, id_token_hint: Option<&str>) -> Result<String> {
        let mut params = vec![
            ("client_id", self.config.client_id.as_str()),
            ("post_logout_redirect_uri", self.config.redirect_uri.as_str()),
        ];
        if let Some(hint) = id_token_hint {
            params.push(("id_token_hint", hint));
        }
        let url = reqwest::Url::parse_with_params(&self.config.logout_endpoint(), &params)
            .map_err(|e| Error::Navigation(format!("invalid logout endpoint: {e}")))?;
        debug!(endpoint = %self.config.logout_endpoint(), "built logout URL");
        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_from_fragment() {
        let params = CallbackParams::from_url(
            "http://localhost:5173/#state=abc&session_state=s1&code=c0de",
        )
        .unwrap();
        assert_eq!(params.code.as_deref(), Some("c0de"));
        assert_eq!(params.state.as_deref(), Some("abc"));
        assert!(params.error.is_none());
    }

    #[test]
    fn callback_from_query_with_error() {
        let params = CallbackParams::from_url(
            "http://localhost:5173/?error=login_required&error_description=Login%20required&state=abc",
        )
        .unwrap();
        assert_eq!(params.error.as_deref(), Some("login_required"));
        assert_eq!(params.error_description.as_deref(), Some("Login required"));
        assert!(params.code.is_none());
    }

    #[test]
    fn callback_rejects_garbage() {
        assert!(matches!(
            CallbackParams::from_url("not a url"),
            Err(Error::InvalidCallback(_))
        ));
    }

    #[test]
    fn logout_url_includes_hint_when_present() {
        let provider = KeycloakProvider::new(OidcConfig::default(), reqwest::Client::new());

        let with_hint = provider.logout_url(Some("id.tok.en")).unwrap();
        assert!(with_hint.starts_with(
            "http://localhost:8080/realms/PortfolioRealm/protocol/openid-connect/logout?"
        ));
        assert!(with_hint.contains("id_token_hint=id.tok.en"));
        assert!(with_hint.contains("client_id=portfolio-frontend"));
        assert!(with_hint.contains("post_logout_redirect_uri=http%3A%2F%2Flocalhost%3A5173%2F"));

        let without = provider.logout_url(None).unwrap();
        assert!(!without.contains("id_token_hint"));
    }
}
