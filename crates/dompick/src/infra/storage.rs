//! Key/value persistence for user preferences.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use dirs_next::config_dir;
use parking_lot::RwLock;
use serde_json::Value;

const PREFS_DIR: &str = "dompick/prefs";

/// Storage for JSON preference blobs keyed by a storage key.
pub trait PreferenceBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Read `key`, substituting `default` when it is absent or unreadable.
    fn get_or(&self, key: &str, default: Value) -> Value {
        match self.get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err) => {
                tracing::warn!(key, error = %format!("{err:#}"), "failed to read preferences; using defaults");
                default
            }
        }
    }
}

/// One pretty-printed JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Backend rooted in the user's config directory (`~/.config/dompick/prefs` on Linux).
    pub fn user_default() -> Option<Self> {
        config_dir().map(|base| Self::new(base.join(PREFS_DIR)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl PreferenceBackend for JsonFileBackend {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed to read preferences at {}", path.display()))?;
        let value = serde_json::from_str(&data)
            .with_context(|| format!("invalid preference data in {}", path.display()))?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("failed to create preference directory {}", self.dir.display())
        })?;

        let data =
            serde_json::to_string_pretty(value).context("failed to serialize preferences")?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, data)
            .with_context(|| format!("failed to write preferences to {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("failed to replace preferences at {}", path.display()))?;
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if !valid {
        bail!("invalid storage key: {key:?}");
    }
    Ok(())
}

/// Process-local backend, used by tests and `--no-persist` runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: impl Into<String>, value: Value) -> Self {
        let backend = Self::default();
        backend.entries.write().insert(key.into(), value);
        backend
    }

    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }
}

impl PreferenceBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.entries.write().insert(key.to_owned(), value.clone());
        Ok(())
    }
}
