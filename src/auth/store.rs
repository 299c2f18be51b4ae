//! Persistent credential storage.
//!
//! Persists the access/refresh token pair across page loads so the session
//! can be recovered without a fresh login. All operations are synchronous,
//! side-effect only the persisted layer, and never fail outward: a corrupt
//! record is treated as "none" and cleared.
//!
//! Two layouts are supported:
//! - default: one JSON record file holding both tokens
//! - keyring: the refresh token lives in the OS keychain and only the access
//!   token is written to disk

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Credential record file name in the storage directory
const CREDENTIALS_FILE: &str = "credentials.json";

/// Pending SSO login state file name (survives the redirect round trip)
const LOGIN_STATE_FILE: &str = "login_state.json";

/// Keyring account name for the refresh token
const KEYRING_USER: &str = "refresh-token";

/// Persisted credential record. Field names match the legacy `authToken` /
/// `refreshToken` storage keys. The record never contains derived user data:
/// legacy `currentUser` entries are read only so they can be purged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(rename = "authToken", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(
        rename = "refreshToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<String>,
    #[serde(rename = "currentUser", default, skip_serializing)]
    legacy_user: Option<serde_json::Value>,
}

impl StoredCredentials {
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
            legacy_user: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// In-flight SSO login state persisted across the provider redirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLogin {
    pub state: String,
    pub verifier: String,
    pub return_path: String,
    pub created_at: DateTime<Utc>,
}

pub struct CredentialStore {
    dir: PathBuf,
    keyring_service: Option<String>,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            keyring_service: None,
        }
    }

    /// Store variant that keeps the refresh token in the OS keychain instead
    /// of the record file.
    pub fn with_keyring(dir: impl Into<PathBuf>, service: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            keyring_service: Some(service.into()),
        }
    }

    /// Persist a credential record, replacing any previous one.
    pub fn save(&self, credentials: &StoredCredentials) {
        let mut record = credentials.clone();
        if let Some(ref service) = self.keyring_service {
            match record.refresh_token.take() {
                Some(refresh) => {
                    if let Err(e) = keyring_entry(service).and_then(|e| e.set_password(&refresh)) {
                        warn!(error = %e, "Failed to store refresh token in keychain");
                    }
                }
                None => self.clear_keyring(service),
            }
        }
        write_json(&self.credentials_path(), &record);
    }

    /// Load the persisted record, or `None` if absent or unreadable.
    /// A legacy `currentUser` entry is purged by rewriting the record.
    pub fn load(&self) -> Option<StoredCredentials> {
        let mut record: StoredCredentials = read_json(&self.credentials_path())?;

        if record.legacy_user.take().is_some() {
            debug!("Purging legacy persisted user from credential record");
            self.save(&record);
        }

        if let Some(ref service) = self.keyring_service {
            match keyring_entry(service).and_then(|e| e.get_password()) {
                Ok(refresh) => record.refresh_token = Some(refresh),
                Err(keyring::Error::NoEntry) => {}
                Err(e) => debug!(error = %e, "No refresh token in keychain"),
            }
        }

        if record.is_empty() {
            None
        } else {
            Some(record)
        }
    }

    /// Remove everything this store persisted.
    pub fn clear(&self) {
        remove_file(&self.credentials_path());
        remove_file(&self.login_state_path());
        if let Some(ref service) = self.keyring_service {
            self.clear_keyring(service);
        }
    }

    /// Persist the PKCE state for an in-flight SSO login.
    pub fn save_login_state(&self, pending: &PendingLogin) {
        write_json(&self.login_state_path(), pending);
    }

    /// Consume the pending login state, if any. The state is single-use:
    /// reading it removes it.
    pub fn take_login_state(&self) -> Option<PendingLogin> {
        let pending = read_json(&self.login_state_path())?;
        remove_file(&self.login_state_path());
        Some(pending)
    }

    fn credentials_path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE)
    }

    fn login_state_path(&self) -> PathBuf {
        self.dir.join(LOGIN_STATE_FILE)
    }

    fn clear_keyring(&self, service: &str) {
        match keyring_entry(service).and_then(|e| e.delete_credential()) {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => debug!(error = %e, "Failed to delete refresh token from keychain"),
        }
    }
}

fn keyring_entry(service: &str) -> Result<Entry, keyring::Error> {
    Entry::new(service, KEYRING_USER)
}

fn write_json<T: Serialize>(path: &Path, value: &T) {
    let contents = match serde_json::to_string_pretty(value) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(error = %e, "Failed to serialize record");
            return;
        }
    };
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(error = %e, path = %parent.display(), "Failed to create storage directory");
            return;
        }
    }
    if let Err(e) = std::fs::write(path, contents) {
        warn!(error = %e, path = %path.display(), "Failed to write record");
    }
}

/// Read and parse a JSON file; an unreadable or corrupt file is removed and
/// treated as absent.
fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to read record; discarding");
            remove_file(path);
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Corrupt record; discarding");
            remove_file(path);
            None
        }
    }
}

fn remove_file(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(error = %e, path = %path.display(), "Failed to remove record");
        }
    }
}
