use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::common::{Token, User};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything the registry persists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryData {
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub permitted_sharers: Vec<String>,
    #[serde(default)]
    pub registered_users: BTreeMap<String, User>,
}

/// Durable storage for [`RegistryData`]
pub trait RegistryStore: Send + Sync {
    fn load(&self) -> Result<RegistryData, RegistryError>;
    fn save(&self, data: &RegistryData) -> Result<(), RegistryError>;
}

/// Pretty-printed JSON file. The file holds refresh tokens, so it is owner-only.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RegistryStore for JsonFileStore {
    fn load(&self) -> Result<RegistryData, RegistryError> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "No registry file, starting empty");
            return Ok(RegistryData::default());
        }

        let json = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn save(&self, data: &RegistryData) -> Result<(), RegistryError> {
        let json = serde_json::to_string_pretty(data)?;

        // Write next to the target and rename so readers never see half a file
        let tmp_path = self.path.with_extension("json.tmp");
        match fs::remove_file(&tmp_path) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        // Owner-only from the moment it exists
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        fs::rename(&tmp_path, &self.path)?;
        tracing::debug!(path = %self.path.display(), "Registry saved");
        Ok(())
    }
}

/// Outcome of [`Registry::register_user`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    TokenUpdated,
    NotPermitted,
}

/// Registered users plus the admin and sharer allow-lists.
///
/// All reads and writes go through one lock. A mutation is applied to a copy,
/// saved, and only then swapped in, so a failed save leaves memory untouched.
pub struct Registry {
    data: Mutex<RegistryData>,
    store: Arc<dyn RegistryStore>,
}

impl Registry {
    pub fn load(store: Arc<dyn RegistryStore>) -> Result<Self, RegistryError> {
        let data = store.load()?;
        tracing::info!(
            registered = data.registered_users.len(),
            admins = data.admins.len(),
            permitted_sharers = data.permitted_sharers.len(),
            "Registry loaded"
        );
        Ok(Self {
            data: Mutex::new(data),
            store,
        })
    }

    pub fn user(&self, id: &str) -> Option<User> {
        self.lock().registered_users.get(id).cloned()
    }

    pub fn is_admin(&self, id: &str) -> bool {
        self.lock().admins.iter().any(|admin| admin == id)
    }

    pub fn is_permitted_sharer(&self, id: &str) -> bool {
        self.lock().permitted_sharers.iter().any(|sharer| sharer == id)
    }

    pub fn snapshot(&self) -> RegistryData {
        self.lock().clone()
    }

    /// Add configured admins that the stored registry doesn't know yet
    pub fn ensure_admins(&self, admins: &[String]) -> Result<(), RegistryError> {
        let mut data = self.lock();
        let missing: Vec<String> = admins
            .iter()
            .filter(|admin| !data.admins.contains(admin))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let mut next = data.clone();
        next.admins.extend(missing);
        self.commit(&mut data, next)
    }

    /// Allow `id` to register as a sharer. Returns `false` if it already was.
    pub fn permit_sharer(&self, id: &str) -> Result<bool, RegistryError> {
        let mut data = self.lock();
        if data.permitted_sharers.iter().any(|sharer| sharer == id) {
            return Ok(false);
        }

        let mut next = data.clone();
        next.permitted_sharers.push(id.to_string());
        self.commit(&mut data, next)?;
        Ok(true)
    }

    /// Register a freshly logged-in user if they are a permitted sharer.
    ///
    /// A user who is already registered gets their stored token replaced, so
    /// logging in again recovers from a revoked refresh token.
    pub fn register_user(&self, user: User) -> Result<Registration, RegistryError> {
        let mut data = self.lock();
        if !data.permitted_sharers.iter().any(|sharer| *sharer == user.id) {
            return Ok(Registration::NotPermitted);
        }

        let outcome = if data.registered_users.contains_key(&user.id) {
            Registration::TokenUpdated
        } else {
            Registration::Registered
        };

        let mut next = data.clone();
        next.registered_users.insert(user.id.clone(), user);
        self.commit(&mut data, next)?;
        Ok(outcome)
    }

    /// Store a refreshed token. Returns `false` if the user isn't registered.
    pub fn update_token(&self, id: &str, token: Token) -> Result<bool, RegistryError> {
        let mut data = self.lock();
        if !data.registered_users.contains_key(id) {
            return Ok(false);
        }

        let mut next = data.clone();
        if let Some(user) = next.registered_users.get_mut(id) {
            user.token = token;
        }
        self.commit(&mut data, next)?;
        Ok(true)
    }

    fn commit(&self, current: &mut RegistryData, next: RegistryData) -> Result<(), RegistryError> {
        blocking(|| self.store.save(&next))?;
        *current = next;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, RegistryData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run blocking IO without stalling other tasks on a multi-threaded runtime
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}
