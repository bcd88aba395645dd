//! Claims extraction from JWT payloads
//!
//! The one place that looks inside a token. Signatures are not verified here:
//! the backend verifies every bearer token it receives, and the client only
//! reads claims to schedule refreshes and decide what to show. Anything that
//! is not a three-segment token with a base64url JSON payload is rejected
//! with `MalformedToken`.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Keycloak emits unpadded base64url, but some proxies re-pad segments.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Subset of the Keycloak access/identity token payload the client uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiry, unix seconds
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub iat: Option<u64>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub realm_access: RealmAccess,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    /// Whether the realm role set contains `role`, upper-cased to match the
    /// realm's role naming.
    pub fn has_realm_role(&self, role: &str) -> bool {
        let wanted = role.to_uppercase();
        self.realm_access.roles.iter().any(|r| *r == wanted)
    }

    /// True if the token expires within `margin_secs` of `now`. A token
    /// without `exp` counts as expired.
    pub fn expires_within(&self, margin_secs: u64, now: u64) -> bool {
        match self.exp {
            Some(exp) => exp <= now.saturating_add(margin_secs),
            None => true,
        }
    }
}

/// Decode the payload segment of a JWT into `Claims`.
pub fn decode(token: &str) -> Result<Claims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(Error::MalformedToken(
            "expected three dot-separated segments".into(),
        ));
    };

    if payload.is_empty() {
        return Err(Error::MalformedToken("empty payload segment".into()));
    }

    let bytes = PAYLOAD_ENGINE
        .decode(payload)
        .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::MalformedToken(format!("payload is not a claims object: {e}")))
}

/// Current unix time in seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};

    fn token_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn decodes_keycloak_payload() {
        let token = token_with_payload(
            r#"{"sub":"f3a1","exp":1900000000,"preferred_username":"alice",
                "given_name":"Alice","family_name":"Liddell",
                "realm_access":{"roles":["ADMIN","offline_access"]}}"#,
        );
        let claims = decode(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("f3a1"));
        assert_eq!(claims.exp, Some(1_900_000_000));
        assert_eq!(claims.preferred_username.as_deref(), Some("alice"));
        assert!(claims.has_realm_role("ADMIN"));
        assert!(claims.has_realm_role("admin"), "role lookup is case-normalized");
        assert!(!claims.has_realm_role("USER"));
    }

    #[test]
    fn missing_realm_access_means_no_roles() {
        let claims = decode(&token_with_payload(r#"{"sub":"x"}"#)).unwrap();
        assert!(claims.realm_access.roles.is_empty());
        assert!(!claims.has_realm_role("ADMIN"));
    }

    #[test]
    fn padded_payload_is_accepted() {
        let token = format!("h.{}.s", URL_SAFE.encode(r#"{"sub":"padded"}"#));
        assert_eq!(decode(&token).unwrap().sub.as_deref(), Some("padded"));
    }

    #[test]
    fn rejects_wrong_segment_count() {
        for token in ["", "opaque-refresh-token", "a.b", "a.b.c.d"] {
            assert!(
                matches!(decode(token), Err(Error::MalformedToken(_))),
                "{token:?} should be malformed"
            );
        }
    }

    #[test]
    fn rejects_non_json_payload() {
        let token = format!("h.{}.s", URL_SAFE_NO_PAD.encode("not json"));
        assert!(matches!(decode(&token), Err(Error::MalformedToken(_))));
        assert!(matches!(decode("h.!!!.s"), Err(Error::MalformedToken(_))));
    }

    #[test]
    fn expiry_margin() {
        let claims = Claims {
            exp: Some(1_000),
            ..Claims::default()
        };
        assert!(!claims.expires_within(5, 900));
        assert!(claims.expires_within(5, 995));
        assert!(claims.expires_within(0, 1_000));
        assert!(Claims::default().expires_within(0, 0));
    }
}
