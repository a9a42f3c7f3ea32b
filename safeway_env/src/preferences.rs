//! Persisted user preferences (string key-value).

use crate::error::EnvError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Trait for the externally writable preference store.
///
/// Implementations must be thread-safe; the settings screen may write while a
/// session is running. The engine only reads on session start and when it is
/// told the preferences changed.
pub trait PreferenceStore: Send + Sync {
    /// Reads a value; `Ok(None)` when the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>, EnvError>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), EnvError>;
}

/// Volatile store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with one entry.
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut values) = store.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        store
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, EnvError> {
        let values = self
            .values
            .lock()
            .map_err(|_| EnvError::store("Preference map poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), EnvError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| EnvError::store("Preference map poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Sled-based persistent preference store
///
/// Uses an embedded key-value database so the choice survives restarts.
pub struct SledPreferenceStore {
    db: sled::Db,
}

impl SledPreferenceStore {
    /// Open a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EnvError> {
        let db = sled::open(path)
            .map_err(|e| EnvError::store(format!("Failed to open sled DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Create a temporary store (for testing)
    pub fn open_temp() -> Result<Self, EnvError> {
        let config = sled::Config::new().temporary(true);
        let db = config
            .open()
            .map_err(|e| EnvError::store(format!("Failed to open temp DB: {}", e)))?;
        Ok(Self { db })
    }
}

impl PreferenceStore for SledPreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, EnvError> {
        let raw = self
            .db
            .get(key.as_bytes())
            .map_err(|e| EnvError::store(format!("Read failed: {}", e)))?;

        match raw {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| EnvError::SerializationError(e.to_string())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), EnvError> {
        self.db
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| EnvError::store(format!("Insert failed: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| EnvError::store(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryPreferenceStore::new();
        assert_eq!(store.get("notificationLevel").unwrap(), None);

        store.set("notificationLevel", "high").unwrap();
        assert_eq!(store.get("notificationLevel").unwrap().as_deref(), Some("high"));

        store.set("notificationLevel", "none").unwrap();
        assert_eq!(store.get("notificationLevel").unwrap().as_deref(), Some("none"));
    }

    #[test]
    fn test_memory_store_with_value() {
        let store = MemoryPreferenceStore::with_value("notificationLevel", "low");
        assert_eq!(store.get("notificationLevel").unwrap().as_deref(), Some("low"));
    }

    #[test]
    fn test_sled_store_persists_values() {
        let store = SledPreferenceStore::open_temp().unwrap();
        assert_eq!(store.get("notificationLevel").unwrap(), None);

        store.set("notificationLevel", "very-high").unwrap();
        assert_eq!(
            store.get("notificationLevel").unwrap().as_deref(),
            Some("very-high")
        );
    }

    #[test]
    fn test_sled_store_rejects_non_utf8() {
        let store = SledPreferenceStore::open_temp().unwrap();
        store.db.insert("notificationLevel", &[0xff, 0xfe][..]).unwrap();

        let result = store.get("notificationLevel");
        assert!(matches!(result, Err(EnvError::SerializationError(_))));
    }
}
