//! Durable key-value storage for session tokens
//!
//! The session client mirrors its tokens here so a restarted process can pick
//! the session back up. Keys are fixed strings; values are opaque strings.
//! Writes are last-write-wins with no cross-process coordination.
//!
//! `FileTokenStore` keeps the whole map in one JSON file, rewritten
//! atomically (temp file + rename, mode 0600) on every change.
//! `MemoryTokenStore` holds the same map in memory for tests and ephemeral
//! sessions.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use common::Secret;

use crate::error::{Error, Result};

pub const AUTHENTICATED_KEY: &str = "kc_authenticated";
pub const ACCESS_TOKEN_KEY: &str = "kc_token";
pub const REFRESH_TOKEN_KEY: &str = "kc_refreshToken";
pub const ID_TOKEN_KEY: &str = "kc_idToken";

/// Prefix for pending authorization requests, suffixed with their `state`.
pub const CALLBACK_KEY_PREFIX: &str = "kc_callback_";

/// The four keys that make up a persisted session.
pub const SESSION_KEYS: [&str; 4] = [
    AUTHENTICATED_KEY,
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    ID_TOKEN_KEY,
];

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable key-value persistence.
///
/// Uses boxed futures so the store can be shared as `Arc<dyn TokenStore>`.
pub trait TokenStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>>;

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>>;

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;

    fn keys(&self) -> BoxFuture<'_, Vec<String>>;
}

/// Tokens as persisted between runs.
#[derive(Debug, Clone)]
pub struct StoredTokens {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
    pub id: Option<Secret<String>>,
}

/// Read the persisted session. Returns `None` unless the authenticated flag
/// is `"true"` and both access and refresh tokens are present and non-empty.
pub async fn load_tokens(store: &dyn TokenStore) -> Option<StoredTokens> {
    if store.get(AUTHENTICATED_KEY).await.as_deref() != Some("true") {
        return None;
    }
    let access = Secret::new(store.get(ACCESS_TOKEN_KEY).await?);
    let refresh = Secret::new(store.get(REFRESH_TOKEN_KEY).await?);
    if access.is_empty() || refresh.is_empty() {
        return None;
    }
    let id = store
        .get(ID_TOKEN_KEY)
        .await
        .filter(|t| !t.is_empty())
        .map(Secret::new);
    Some(StoredTokens { access, refresh, id })
}

pub async fn has_stored_tokens(store: &dyn TokenStore) -> bool {
    load_tokens(store).await.is_some()
}

/// Persist a session. A missing identity token removes any stale one.
pub async fn save_tokens(store: &dyn TokenStore, tokens: &StoredTokens) -> Result<()> {
    store
        .set(ACCESS_TOKEN_KEY, tokens.access.expose().clone())
        .await?;
    store
        .set(REFRESH_TOKEN_KEY, tokens.refresh.expose().clone())
        .await?;
    match &tokens.id {
        Some(id) => store.set(ID_TOKEN_KEY, id.expose().clone()).await?,
        None => store.remove(ID_TOKEN_KEY).await?,
    }
    store.set(AUTHENTICATED_KEY, "true".into()).await
}

/// Remove every session key and any pending authorization request.
pub async fn clear_tokens(store: &dyn TokenStore) -> Result<()> {
    for key in SESSION_KEYS {
        store.remove(key).await?;
    }
    clear_pending_authorizations(store).await
}

/// Remove every `kc_callback_*` entry.
pub async fn clear_pending_authorizations(store: &dyn TokenStore) -> Result<()> {
    for key in store.keys().await {
        if key.starts_with(CALLBACK_KEY_PREFIX) {
            store.remove(&key).await?;
        }
    }
    Ok(())
}

/// JSON-file backed store.
///
/// The Mutex serializes writes; reads clone out of the in-memory map.
pub struct FileTokenStore {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl FileTokenStore {
    /// Open the store at `path`.
    ///
    /// A missing file is created as `{}`. A file that does not parse is
    /// treated as empty and replaced on the next write, so a corrupt file
    /// degrades to "not signed in" instead of blocking startup.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Storage(format!("reading token file: {e}")))?;
            match serde_json::from_str::<HashMap<String, String>>(&contents) {
                Ok(entries) => {
                    info!(path = %path.display(), keys = entries.len(), "loaded token store");
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "token file is corrupt, starting empty");
                    HashMap::new()
                }
            }
        } else {
            info!(path = %path.display(), "token file not found, starting empty");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move { self.state.lock().await.get(key).cloned() })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.insert(key.to_owned(), value);
            debug!(key, "stored value");
            write_atomic(&self.path, &state).await
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.remove(key).is_some() {
                debug!(key, "removed value");
                write_atomic(&self.path, &state).await?;
            }
            Ok(())
        })
    }

    fn keys(&self) -> BoxFuture<'_, Vec<String>> {
        Box::pin(async move { self.state.lock().await.keys().cloned().collect() })
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryTokenStore {
    state: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl TokenStore for MemoryTokenStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move { self.state.lock().await.get(key).cloned() })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.state.lock().await.insert(key.to_owned(), value);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.state.lock().await.remove(key);
            Ok(())
        })
    }

    fn keys(&self) -> BoxFuture<'_, Vec<String>> {
        Box::pin(async move { self.state.lock().await.keys().cloned().collect() })
    }
}

/// Write the map to `path` via a temp file in the same directory, then
/// rename over the target. Permissions are 0600 on unix since the file holds
/// bearer and refresh tokens.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Storage(format!("serializing token store: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted token store");
    Ok(())
}
