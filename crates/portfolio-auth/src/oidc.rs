//! Keycloak realm configuration and endpoint layout
//!
//! The front-end is a public OIDC client: none of these values are secrets.
//! Defaults match a local Keycloak running the portfolio realm.

use serde::Deserialize;

pub const DEFAULT_KEYCLOAK_URL: &str = "http://localhost:8080";

pub const DEFAULT_REALM: &str = "PortfolioRealm";

pub const DEFAULT_CLIENT_ID: &str = "portfolio-frontend";

/// Where the provider sends the browser back after hosted login and logout.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5173/";

/// `openid` is required for the provider to issue an identity token.
pub const SCOPES: &str = "openid";

/// Realm role that grants access to the admin area.
pub const ADMIN_ROLE: &str = "ADMIN";

/// Connection settings for one Keycloak realm and client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    /// Base URL of the Keycloak server, without the `/realms` suffix
    pub url: String,
    pub realm: String,
    pub client_id: String,
    pub redirect_uri: String,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_KEYCLOAK_URL.into(),
            realm: DEFAULT_REALM.into(),
            client_id: DEFAULT_CLIENT_ID.into(),
            redirect_uri: DEFAULT_REDIRECT_URI.into(),
        }
    }
}

impl OidcConfig {
    pub fn new(url: impl Into<String>, realm: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    fn realm_url(&self) -> String {
        format!("{}/realms/{}", self.url.trim_end_matches('/'), self.realm)
    }

    pub fn authorization_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/auth", self.realm_url())
    }

    /// Password, refresh and authorization-code grants all POST here.
    pub fn token_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.realm_url())
    }

    pub fn logout_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/logout", self.realm_url())
    }

    /// Account console REST endpoint returning the signed-in user's profile.
    pub fn account_endpoint(&self) -> String {
        format!("{}/account", self.realm_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_local_portfolio_realm() {
        let config = OidcConfig::default();
        assert_eq!(config.url, "http://localhost:8080");
        assert_eq!(config.realm, "PortfolioRealm");
        assert_eq!(config.client_id, "portfolio-frontend");
    }

    #[test]
    fn token_endpoint_layout() {
        let config = OidcConfig::new("https://sso.example.com/", "PortfolioRealm", "web");
        assert_eq!(
            config.token_endpoint(),
            "https://sso.example.com/realms/PortfolioRealm/protocol/openid-connect/token"
        );
        assert_eq!(
            config.logout_endpoint(),
            "https://sso.example.com/realms/PortfolioRealm/protocol/openid-connect/logout"
        );
        assert_eq!(
            config.account_endpoint(),
            "https://sso.example.com/realms/PortfolioRealm/account"
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: OidcConfig = serde_json::from_str(r#"{"realm":"Staging"}"#).unwrap();
        assert_eq!(config.realm, "Staging");
        assert_eq!(config.url, DEFAULT_KEYCLOAK_URL);
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
    }
}
