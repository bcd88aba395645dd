//! Signed-in user profile

use serde::{Deserialize, Serialize};

/// Account profile as returned by the provider's account endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// The user shown by the application once a session exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Option<String>,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: String,
}

impl User {
    pub fn from_profile(profile: AccountProfile) -> Self {
        let username = profile.username.unwrap_or_default();
        let full_name = full_name(
            profile.first_name.as_deref(),
            profile.last_name.as_deref(),
            &username,
        );
        Self {
            id: profile.id,
            username,
            email: profile.email,
            first_name: profile.first_name,
            last_name: profile.last_name,
            full_name,
        }
    }

    /// Fallback record when the profile cannot be loaded after a
    /// successful credential login.
    pub fn minimal(username: &str) -> Self {
        Self {
            id: None,
            username: username.to_owned(),
            email: None,
            first_name: None,
            last_name: None,
            full_name: username.to_owned(),
        }
    }
}

fn full_name(first: Option<&str>, last: Option<&str>, username: &str) -> String {
    let joined = [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        username.to_owned()
    } else {
        joined
    }
}
