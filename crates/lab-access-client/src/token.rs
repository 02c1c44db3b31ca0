//! # Token Store
//!
//! Persisted client state. The bearer token lives under the fixed key
//! [`AUTH_TOKEN_KEY`] in a small JSON object file, mirroring a browser's
//! local storage. Other keys in the file are preserved on write.
//!
//! The [`SessionStore`](crate::session::SessionStore) is the only writer;
//! the REST client and the hub access-token factory only read.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{LabError, LabResult};

/// Key under which the bearer token is persisted.
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Cheaply cloneable handle to the persisted bearer token.
#[derive(Debug, Clone)]
pub struct TokenStore {
    inner: Arc<TokenInner>,
}

#[derive(Debug)]
struct TokenInner {
    path: Option<PathBuf>,
    cache: RwLock<Option<String>>,
}

impl TokenStore {
    /// A store that never touches the filesystem.
    pub fn in_memory(token: Option<String>) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                path: None,
                cache: RwLock::new(token),
            }),
        }
    }

    /// Open a file-backed store, loading the token if the file exists.
    ///
    /// # Errors
    /// Returns [`LabError::Storage`] if the file exists but cannot be read
    /// or is not a JSON object.
    pub fn open(path: impl Into<PathBuf>) -> LabResult<Self> {
        let path = path.into();
        let token = read_map(&path)?
            .get(AUTH_TOKEN_KEY)
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        tracing::debug!(path = %path.display(), has_token = token.is_some(), "Opened token store");

        Ok(Self {
            inner: Arc::new(TokenInner {
                path: Some(path),
                cache: RwLock::new(token),
            }),
        })
    }

    /// Current token, if any.
    pub fn get(&self) -> Option<String> {
        self.inner
            .cache
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Returns `true` when a token is stored.
    pub fn has_token(&self) -> bool {
        self.inner
            .cache
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// File backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub(crate) fn set(&self, token: &str) -> LabResult<()> {
        if let Some(path) = &self.inner.path {
            let mut map = read_map(path)?;
            map.insert(
                AUTH_TOKEN_KEY.to_string(),
                serde_json::Value::String(token.to_string()),
            );
            write_map(path, &map)?;
        }
        if let Ok(mut guard) = self.inner.cache.write() {
            *guard = Some(token.to_string());
        }
        Ok(())
    }

    /// Clears the cached token first so readers stop using it even when the
    /// file update fails.
    pub(crate) fn remove(&self) -> LabResult<()> {
        if let Ok(mut guard) = self.inner.cache.write() {
            *guard = None;
        }
        if let Some(path) = &self.inner.path {
            let mut map = read_map(path)?;
            if map.remove(AUTH_TOKEN_KEY).is_some() {
                write_map(path, &map)?;
            }
        }
        Ok(())
    }
}

type StorageMap = serde_json::Map<String, serde_json::Value>;

fn read_map(path: &Path) -> LabResult<StorageMap> {
    if !path.exists() {
        return Ok(StorageMap::new());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| LabError::Storage {
        reason: format!("Failed to read '{}': {}", path.display(), e),
    })?;
    if contents.trim().is_empty() {
        return Ok(StorageMap::new());
    }
    match serde_json::from_str::<serde_json::Value>(&contents) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(LabError::Storage {
            reason: format!("'{}' is not a JSON object", path.display()),
        }),
        Err(e) => Err(LabError::Storage {
            reason: format!("Failed to parse '{}': {}", path.display(), e),
        }),
    }
}

fn write_map(path: &Path, map: &StorageMap) -> LabResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(map)?;
    std::fs::write(path, json).map_err(|e| LabError::Storage {
        reason: format!("Failed to write '{}': {}", path.display(), e),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
