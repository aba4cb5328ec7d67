//! Durable storage for session tokens

use crate::lock;
use async_trait::async_trait;
use ledger_core::{CoreError, CoreResult};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const TOKEN_EXPIRY_KEY: &str = "token_expiry";

/// String key/value storage that outlives the process
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> CoreResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> CoreResult<()>;
    async fn remove(&self, key: &str) -> CoreResult<()>;
}

/// Volatile store, mostly for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> CoreResult<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// JSON object on disk, rewritten on every change
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> CoreResult<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                warn!(path = %self.path.display(), error = %err, "Ignoring unreadable session file");
                BTreeMap::new()
            })),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(CoreError::storage(format!(
                "failed to read {}: {err}",
                self.path.display()
            ))),
        }
    }

    async fn write_entries(&self, entries: &BTreeMap<String, String>) -> CoreResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn update<F>(&self, change: F) -> CoreResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_entries().await?;
        if change(&mut entries) {
            self.write_entries(&entries).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let _guard = self.write_lock.lock().await;
        Ok(self.read_entries().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
        .await
    }

    async fn remove(&self, key: &str) -> CoreResult<()> {
        self.update(|entries| entries.remove(key).is_some()).await
    }
}

/// The three persisted session keys
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PersistedTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<i64>,
}

impl PersistedTokens {
    /// Read the persisted record; an unparsable expiry is treated as absent
    pub async fn load(store: &dyn KeyValueStore) -> CoreResult<Self> {
        let access_token = store.get(ACCESS_TOKEN_KEY).await?;
        let refresh_token = store.get(REFRESH_TOKEN_KEY).await?;
        let token_expiry = match store.get(TOKEN_EXPIRY_KEY).await? {
            Some(raw) => raw.parse().map_or_else(
                |_| {
                    warn!("Ignoring unparsable persisted token expiry");
                    None
                },
                Some,
            ),
            None => None,
        };

        Ok(Self {
            access_token,
            refresh_token,
            token_expiry,
        })
    }

    /// Write every present field and delete every absent one
    pub async fn save(&self, store: &dyn KeyValueStore) -> CoreResult<()> {
        write_or_remove(store, ACCESS_TOKEN_KEY, self.access_token.as_deref()).await?;
        write_or_remove(store, REFRESH_TOKEN_KEY, self.refresh_token.as_deref()).await?;
        let expiry = self.token_expiry.map(|expiry| expiry.to_string());
        write_or_remove(store, TOKEN_EXPIRY_KEY, expiry.as_deref()).await
    }

    /// Delete all three keys
    pub async fn clear(store: &dyn KeyValueStore) -> CoreResult<()> {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY] {
            store.remove(key).await?;
        }
        Ok(())
    }
}

async fn write_or_remove(
    store: &dyn KeyValueStore,
    key: &str,
    value: Option<&str>,
) -> CoreResult<()> {
    match value {
        Some(value) => store.set(key, value).await,
        None => store.remove(key).await,
    }
}

impl fmt::Debug for PersistedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedTokens")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}
