/// Token and profile persistence with pluggable storage
use keyring::Entry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// The bearer credential pair for the current session.
///
/// Exactly one pair is persisted at a time; saving a new pair fully
/// replaces the old one. The strings are opaque to this layer except
/// for claim decoding in [`crate::claims`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Display-only user data cached alongside the token pair.
///
/// Non-authoritative; cleared together with the pair on logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub last_login: Option<String>,
}

/// Storage interface for the token pair and cached profile
pub trait TokenStorage: Send + Sync {
    /// Persist the token pair, replacing any existing one
    fn save_pair(&self, pair: &TokenPair) -> Result<(), String>;

    /// Load the stored token pair, if any
    fn load_pair(&self) -> Result<Option<TokenPair>, String>;

    /// Remove the stored token pair
    fn clear_pair(&self) -> Result<(), String>;

    /// Persist the cached user profile
    fn save_profile(&self, profile: &UserProfile) -> Result<(), String>;

    /// Load the cached user profile, if any
    fn load_profile(&self) -> Result<Option<UserProfile>, String>;

    /// Remove the cached user profile
    fn clear_profile(&self) -> Result<(), String>;

    /// Read the stored pair, treating any backend failure as "nothing stored".
    ///
    /// A corrupted or unreadable store degrades to an anonymous session
    /// rather than surfacing an error to every call site.
    fn current_pair(&self) -> Option<TokenPair> {
        self.load_pair().unwrap_or(None)
    }

    /// Clear both blobs, ignoring backend errors. Used on logout and on
    /// irrecoverable refresh failure.
    fn clear_session(&self) {
        let _ = self.clear_pair();
        let _ = self.clear_profile();
    }
}

/// In-memory storage implementation
///
/// Thread-safe, non-persistent. Suitable for tests and for embedded
/// (anonymous widget) contexts that never outlive the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    pair: RwLock<Option<TokenPair>>,
    profile: RwLock<Option<UserProfile>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryStorage {
    fn save_pair(&self, pair: &TokenPair) -> Result<(), String> {
        *self.pair.write() = Some(pair.clone());
        Ok(())
    }

    fn load_pair(&self) -> Result<Option<TokenPair>, String> {
        Ok(self.pair.read().clone())
    }

    fn clear_pair(&self) -> Result<(), String> {
        *self.pair.write() = None;
        Ok(())
    }

    fn save_profile(&self, profile: &UserProfile) -> Result<(), String> {
        *self.profile.write() = Some(profile.clone());
        Ok(())
    }

    fn load_profile(&self) -> Result<Option<UserProfile>, String> {
        Ok(self.profile.read().clone())
    }

    fn clear_profile(&self) -> Result<(), String> {
        *self.profile.write() = None;
        Ok(())
    }
}

/// File-based storage implementation using XDG conventions
///
/// Persists the pair and profile as two JSON files so the session
/// survives process restarts. Corrupt or unreadable files read as
/// absent rather than failing the caller.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

const TOKENS_FILE: &str = "tokens.json";
const PROFILE_FILE: &str = "profile.json";

impl FileStorage {
    /// Create a file storage instance for an application name
    ///
    /// Respects XDG Base Directory Specification on Unix systems:
    /// - Checks $XDG_DATA_HOME environment variable first
    /// - Falls back to the platform data directory otherwise
    ///
    /// Stores data in <data_dir>/<app_name>/
    pub fn new(app_name: &str) -> Result<Self, String> {
        let base_dir = if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
            PathBuf::from(xdg_data)
        } else {
            dirs::data_dir().ok_or_else(|| "Could not determine data directory".to_string())?
        };

        Self::with_path(base_dir.join(app_name))
    }

    /// Create a file storage instance with a custom path
    pub fn with_path(path: PathBuf) -> Result<Self, String> {
        fs::create_dir_all(&path)
            .map_err(|e| format!("Failed to create storage directory: {}", e))?;

        Ok(Self { base_path: path })
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), String> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| format!("Failed to serialize {}: {}", file, e))?;

        fs::write(self.base_path.join(file), content)
            .map_err(|e| format!("Failed to write {}: {}", file, e))
    }

    // Missing, unreadable, and corrupt files all read as None.
    fn read_json<T: for<'de> Deserialize<'de>>(&self, file: &str) -> Option<T> {
        let content = fs::read_to_string(self.base_path.join(file)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn remove(&self, file: &str) -> Result<(), String> {
        match fs::remove_file(self.base_path.join(file)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("Failed to remove {}: {}", file, e)),
        }
    }
}

impl TokenStorage for FileStorage {
    fn save_pair(&self, pair: &TokenPair) -> Result<(), String> {
        self.write_json(TOKENS_FILE, pair)
    }

    fn load_pair(&self) -> Result<Option<TokenPair>, String> {
        Ok(self.read_json(TOKENS_FILE))
    }

    fn clear_pair(&self) -> Result<(), String> {
        self.remove(TOKENS_FILE)
    }

    fn save_profile(&self, profile: &UserProfile) -> Result<(), String> {
        self.write_json(PROFILE_FILE, profile)
    }

    fn load_profile(&self) -> Result<Option<UserProfile>, String> {
        Ok(self.read_json(PROFILE_FILE))
    }

    fn clear_profile(&self) -> Result<(), String> {
        self.remove(PROFILE_FILE)
    }
}

/// Secure storage using the OS credential manager
///
/// This storage backend uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service API (libsecret)
///
/// The token pair is stored encrypted by the OS; the profile rides
/// along in the same manager since it is small and cleared together
/// with the pair.
#[derive(Debug, Clone)]
pub struct KeyringStorage {
    app_name: String,
}

const PAIR_ACCOUNT: &str = "token-pair";
const PROFILE_ACCOUNT: &str = "user-profile";

impl KeyringStorage {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
        }
    }

    fn entry(&self, account: &str) -> Result<Entry, String> {
        let service = format!("pfortner-{}", self.app_name);
        Entry::new(&service, account).map_err(|e| format!("Failed to create keyring entry: {}", e))
    }

    fn save<T: Serialize>(&self, account: &str, value: &T) -> Result<(), String> {
        let json =
            serde_json::to_string(value).map_err(|e| format!("Failed to serialize: {}", e))?;
        self.entry(account)?
            .set_password(&json)
            .map_err(|e| format!("Failed to save to keyring: {}", e))
    }

    fn load<T: for<'de> Deserialize<'de>>(&self, account: &str) -> Result<Option<T>, String> {
        match self.entry(account)?.get_password() {
            // A corrupt entry reads as absent, matching the file backend.
            Ok(json) => Ok(serde_json::from_str(&json).ok()),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(format!("Failed to read from keyring: {}", e)),
        }
    }

    fn delete(&self, account: &str) -> Result<(), String> {
        match self.entry(account)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(format!("Failed to delete from keyring: {}", e)),
        }
    }
}

impl TokenStorage for KeyringStorage {
    fn save_pair(&self, pair: &TokenPair) -> Result<(), String> {
        self.save(PAIR_ACCOUNT, pair)
    }

    fn load_pair(&self) -> Result<Option<TokenPair>, String> {
        self.load(PAIR_ACCOUNT)
    }

    fn clear_pair(&self) -> Result<(), String> {
        self.delete(PAIR_ACCOUNT)
    }

    fn save_profile(&self, profile: &UserProfile) -> Result<(), String> {
        self.save(PROFILE_ACCOUNT, profile)
    }

    fn load_profile(&self) -> Result<Option<UserProfile>, String> {
        self.load(PROFILE_ACCOUNT)
    }

    fn clear_profile(&self) -> Result<(), String> {
        self.delete(PROFILE_ACCOUNT)
    }
}
