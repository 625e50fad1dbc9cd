//! Login session: who is signed in and which bearer token to send.
//!
//! The session is persisted in a small key-value store so that it survives
//! restarts. It is read once at start, written on login and cleared on logout.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::{AgendaError, AgendaResult};
use crate::event::UserId;

const AUTH_TOKEN_KEY: &str = "auth_token";
const USER_ID_KEY: &str = "user_id";

/// Persistent string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AgendaResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AgendaResult<()>;
    fn remove(&self, key: &str) -> AgendaResult<()>;
}

/// Key-value store kept as a flat toml table on disk.
pub struct TomlFileStore {
    path: PathBuf,
}

impl TomlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TomlFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> AgendaResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| {
            AgendaError::Serialization(format!("{}: {}", self.path.display(), e))
        })
    }

    fn write_table(&self, table: &BTreeMap<String, String>) -> AgendaResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string(table).map_err(|e| AgendaError::Serialization(e.to_string()))?;

        let temp = self.path.with_extension("toml.tmp");
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for TomlFileStore {
    fn get(&self, key: &str) -> AgendaResult<Option<String>> {
        Ok(self.read_table()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> AgendaResult<()> {
        let mut table = self.read_table()?;
        table.insert(key.to_string(), value.to_string());
        self.write_table(&table)
    }

    fn remove(&self, key: &str) -> AgendaResult<()> {
        let mut table = self.read_table()?;
        if table.remove(key).is_some() {
            self.write_table(&table)?;
        }
        Ok(())
    }
}

/// In-memory key-value store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AgendaResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AgendaResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AgendaResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: UserId,
    pub token: String,
}

/// Holds the current identity. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    current: Arc<RwLock<Option<Credentials>>>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        SessionStore {
            store,
            current: Arc::new(RwLock::new(None)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    /// Read persisted credentials into memory. A missing token or the `-1`
    /// user sentinel both mean nobody is signed in.
    pub fn restore(&self) -> AgendaResult<Option<UserId>> {
        let token = self.store.get(AUTH_TOKEN_KEY)?.filter(|t| !t.is_empty());
        let user_id = self
            .store
            .get(USER_ID_KEY)?
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(UserId::from_stored);

        let credentials = match (user_id, token) {
            (Some(user_id), Some(token)) => Some(Credentials { user_id, token }),
            _ => None,
        };

        debug!(user_id = ?credentials.as_ref().map(|c| c.user_id), "Restored session");
        let user_id = credentials.as_ref().map(|c| c.user_id);
        *self.write() = credentials;
        Ok(user_id)
    }

    pub fn save(&self, credentials: Credentials) -> AgendaResult<()> {
        if !credentials.user_id.is_valid() {
            return Err(AgendaError::Validation(format!(
                "Invalid user id {}",
                credentials.user_id
            )));
        }

        self.store.set(AUTH_TOKEN_KEY, &credentials.token)?;
        self.store
            .set(USER_ID_KEY, &credentials.user_id.0.to_string())?;

        info!(user_id = %credentials.user_id, "Signed in");
        *self.write() = Some(credentials);
        Ok(())
    }

    pub fn clear(&self) -> AgendaResult<()> {
        self.store.remove(AUTH_TOKEN_KEY)?;
        self.store.set(USER_ID_KEY, &UserId::NONE.to_string())?;

        info!("Signed out");
        *self.write() = None;
        Ok(())
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.read().as_ref().map(|c| c.user_id)
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.read().clone()
    }

    /// Token for the `Authorization` header.
    pub fn bearer(&self) -> AgendaResult<String> {
        self.read()
            .as_ref()
            .map(|c| c.token.clone())
            .ok_or_else(|| AgendaError::Auth("No active session, log in first".into()))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Credentials>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Credentials>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}
