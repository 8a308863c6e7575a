mod session;
mod settings;

pub use settings::{default_value, keys, SettingsStore, ViewerSettings};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: u32 = 1;

/// Overrides the configuration directory when set and non-empty.
pub const CONFIG_DIR_ENV: &str = "PAGETURN_CONFIG_DIR";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve configuration directory")]
    NoConfigDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("XML error: {0}")]
    Xml(String),
    #[error("unsupported settings version {0}")]
    UnsupportedVersion(u32),
}

/// Result of a best-effort persistence step.
///
/// `Disabled` means the feature is switched off in the settings and nothing
/// was read; `Ignored` carries a failure that was logged and otherwise
/// swallowed.
#[derive(Debug)]
pub enum PersistOutcome<T> {
    Disabled,
    Ignored(StorageError),
    Done(T),
}

impl<T> PersistOutcome<T> {
    /// `Done` on success; otherwise logs the error and returns `Ignored`.
    pub fn from_result(what: &'static str, result: Result<T, StorageError>) -> Self {
        match result {
            Ok(value) => Self::Done(value),
            Err(err) => {
                tracing::warn!(what, error = %err, "persistence step failed, ignoring");
                Self::Ignored(err)
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// The value, or `None` for disabled and ignored outcomes.
    pub fn done(self) -> Option<T> {
        match self {
            Self::Done(value) => Some(value),
            Self::Disabled | Self::Ignored(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PersistOutcome<U> {
        match self {
            Self::Disabled => PersistOutcome::Disabled,
            Self::Ignored(err) => PersistOutcome::Ignored(err),
            Self::Done(value) => PersistOutcome::Done(f(value)),
        }
    }
}

/// Files of one configuration directory: `settings.json`, `tabs.xml` and
/// `bookmarks.xml`.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsEnvelope {
    version: u32,
    #[serde(default)]
    values: serde_json::Map<String, serde_json::Value>,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("org", "pageturn", "pageturn")
            .ok_or(StorageError::NoConfigDirectory)?;

        Ok(Self { root: dirs.config_dir().to_path_buf() })
    }

    /// `PAGETURN_CONFIG_DIR` if set, otherwise the platform config directory.
    pub fn from_env_or_default() -> Result<Self, StorageError> {
        match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Ok(Self::with_root(dir)),
            _ => Self::from_default_project(),
        }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn tabs_path(&self) -> PathBuf {
        self.root.join("tabs.xml")
    }

    pub fn bookmarks_path(&self) -> PathBuf {
        self.root.join("bookmarks.xml")
    }

    /// Reads the settings file. A missing file yields an empty store, so every
    /// key falls back to its default.
    pub fn load_settings(&self) -> Result<SettingsStore, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(SettingsStore::default());
        }

        let bytes = fs::read(path)?;
        let envelope: SettingsEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version > SETTINGS_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion(envelope.version));
        }

        Ok(envelope.values.into_iter().collect())
    }

    pub fn save_settings(&self, settings: &SettingsStore) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope = SettingsEnvelope {
            version: SETTINGS_SCHEMA_VERSION,
            values: settings.iter().map(|(key, value)| (key.to_owned(), value.clone())).collect(),
        };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.settings_path(), bytes)?;
        Ok(())
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn remove_file(path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path().join("nested"));

        let mut settings = SettingsStore::default();
        settings.set(keys::RESTORE_TABS, true);
        settings.set(keys::CACHE_SIZE, 1024);
        settings.set(keys::FILE_TOOL_BAR, json!(["refresh"]));

        store.save_settings(&settings).expect("save should succeed");
        let loaded = store.load_settings().expect("load should succeed");

        assert_eq!(loaded, settings);
    }

    #[test]
    fn load_defaults_when_file_absent() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());

        let loaded = store.load_settings().expect("load should succeed");
        assert!(loaded.is_empty());
        assert!(!ViewerSettings::from_store(&loaded).restore_tabs);
    }

    #[test]
    fn newer_settings_version_is_rejected() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());
        fs::write(store.settings_path(), r#"{"version": 99, "values": {}}"#).expect("write");

        let err = store.load_settings().expect_err("should refuse unknown version");
        assert!(matches!(err, StorageError::UnsupportedVersion(99)));
    }

    #[test]
    fn corrupt_settings_are_a_serde_error() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());
        fs::write(store.settings_path(), "{ not json").expect("write");

        assert!(matches!(store.load_settings(), Err(StorageError::Serde(_))));
    }

    #[test]
    fn outcome_map_and_done() {
        let done: PersistOutcome<u32> = PersistOutcome::Done(2);
        assert_eq!(done.map(|n| n * 2).done(), Some(4));

        let disabled: PersistOutcome<u32> = PersistOutcome::Disabled;
        assert!(disabled.is_disabled());
        assert_eq!(disabled.done(), None);

        let ignored =
            PersistOutcome::<u32>::from_result("test", Err(StorageError::Xml("bad".into())));
        assert!(matches!(ignored, PersistOutcome::Ignored(StorageError::Xml(_))));
    }
}
