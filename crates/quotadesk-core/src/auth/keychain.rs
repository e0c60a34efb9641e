use keyring::Entry;

use super::store::{PersistedSession, SessionStore, StoreError, STORAGE_KEY};

const SERVICE_NAME: &str = "quotadesk";

/// Whether this build has a native keychain behind `keyring`. Elsewhere
/// keyring falls back to an in-memory store that forgets everything on exit.
pub const NATIVE_KEYCHAIN: bool = cfg!(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "windows",
    target_os = "linux"
));

/// Keeps the session JSON as a secret in the OS keychain.
pub struct KeychainSessionStore {
    entry: Entry,
}

impl KeychainSessionStore {
    pub fn new() -> Result<Self, StoreError> {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Result<Self, StoreError> {
        let entry = Entry::new(service, STORAGE_KEY)?;
        Ok(Self { entry })
    }
}

impl SessionStore for KeychainSessionStore {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        match self.entry.get_password() {
            Ok(secret) => Ok(Some(serde_json::from_str(&secret)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, session: &PersistedSession) -> Result<(), StoreError> {
        let secret = serde_json::to_string(session)?;
        self.entry.set_password(&secret)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
