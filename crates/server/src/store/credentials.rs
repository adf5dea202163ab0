use std::collections::BTreeMap;
use std::path::PathBuf;
use std::{fs, io};

use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::StoreError;

const SALT_LEN: usize = 16;

/// Checks and creates user credentials.
pub trait CredentialStore: Send + Sync + 'static {
    /// True when `username` exists and `password` matches.
    fn check_credentials(&self, username: &str, password: &str) -> Result<bool, StoreError>;

    /// Create a user; false when the username is already taken.
    fn create_user(
        &self,
        display_name: &str,
        username: &str,
        password: &str,
    ) -> Result<bool, StoreError>;
}

/// What gets persisted per user. Passwords are stored as salted SHA-256
/// digests, never as plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUser {
    display_name: String,
    salt: String,
    password_digest: String,
}

impl StoredUser {
    fn new(display_name: &str, password: &str) -> Self {
        let salt = new_salt();
        Self {
            display_name: display_name.to_string(),
            password_digest: digest_password(&salt, password),
            salt,
        }
    }

    fn matches(&self, password: &str) -> bool {
        digest_password(&self.salt, password) == self.password_digest
    }
}

fn new_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hex::encode(salt)
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Credential store persisted as a JSON file keyed by username.
pub struct JsonCredentialStore {
    path: PathBuf,
    users: RwLock<BTreeMap<String, StoredUser>>,
}

impl JsonCredentialStore {
    /// Open the store, loading any existing users. A missing file is an
    /// empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let users = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(StoreError::Io(err)),
        };
        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }

    fn persist(&self, users: &BTreeMap<String, StoredUser>) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(users)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

impl CredentialStore for JsonCredentialStore {
    fn check_credentials(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        let users = self.users.read();
        Ok(users
            .get(username)
            .map(|user| user.matches(password))
            .unwrap_or(false))
    }

    fn create_user(
        &self,
        display_name: &str,
        username: &str,
        password: &str,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.write();
        if users.contains_key(username) {
            return Ok(false);
        }

        users.insert(username.to_string(), StoredUser::new(display_name, password));
        self.persist(&users)?;
        Ok(true)
    }
}

/// In-memory credential store, used by tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: RwLock<BTreeMap<String, StoredUser>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user directly, bypassing registration.
    pub fn with_user(self, display_name: &str, username: &str, password: &str) -> Self {
        self.users
            .write()
            .insert(username.to_string(), StoredUser::new(display_name, password));
        self
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn check_credentials(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        let users = self.users.read();
        Ok(users
            .get(username)
            .map(|user| user.matches(password))
            .unwrap_or(false))
    }

    fn create_user(
        &self,
        display_name: &str,
        username: &str,
        password: &str,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.write();
        if users.contains_key(username) {
            return Ok(false);
        }
        users.insert(username.to_string(), StoredUser::new(display_name, password));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_at(dir: &tempfile::TempDir) -> JsonCredentialStore {
        JsonCredentialStore::open(dir.path().join("users.json")).expect("open")
    }

    #[test]
    fn test_create_then_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);

        assert!(store.create_user("Ada Lovelace", "ada", "hunter2").unwrap());
        assert!(store.check_credentials("ada", "hunter2").unwrap());
        assert!(!store.check_credentials("ada", "wrong").unwrap());
        assert!(!store.check_credentials("nobody", "hunter2").unwrap());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);

        assert!(store.create_user("Ada", "ada", "one").unwrap());
        assert!(!store.create_user("Impostor", "ada", "two").unwrap());
        // The original password still holds.
        assert!(store.check_credentials("ada", "one").unwrap());
        assert!(!store.check_credentials("ada", "two").unwrap());
    }

    #[test]
    fn test_reopen_preserves_users() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store_at(&dir);
            store.create_user("Ada", "ada", "hunter2").unwrap();
        }

        let reopened = store_at(&dir);
        assert!(reopened.check_credentials("ada", "hunter2").unwrap());
    }

    #[test]
    fn test_password_not_stored_in_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        store.create_user("Ada", "ada", "hunter2").unwrap();

        let raw = std::fs::read_to_string(dir.path().join("users.json")).unwrap();
        assert!(raw.contains("ada"));
        assert!(!raw.contains("hunter2"));
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        assert!(!store.check_credentials("anyone", "anything").unwrap());
    }

    #[test]
    fn test_memory_store_seeding() {
        let store = MemoryCredentialStore::new().with_user("Ada", "ada", "hunter2");
        assert!(store.check_credentials("ada", "hunter2").unwrap());
        assert!(!store.create_user("Impostor", "ada", "two").unwrap());
    }

    #[test]
    fn test_salts_differ_between_users() {
        let a = StoredUser::new("A", "same-password");
        let b = StoredUser::new("B", "same-password");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.password_digest, b.password_digest);
    }
}
