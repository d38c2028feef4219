//! TOML-based configuration persistence for the remote client.
//!
//! Reads and writes [`AppConfig`] in the platform-appropriate directory:
//! - Windows:  `%APPDATA%\MonitorControlRemote\config.toml`
//! - Linux:    `~/.config/monitorcontrol-remote/config.toml`
//! - macOS:    `~/Library/Application Support/MonitorControlRemote/config.toml`
//!
//! # File layout (for beginners)
//!
//! ```toml
//! [connection]
//! host = "192.168.1.20"
//! port = 51423
//! token = "..."
//!
//! [client]
//! log_level = "info"
//! scan_concurrency = 64
//! ```
//!
//! The `[connection]` section is absent until the user saves settings.  The
//! port is read as a plain integer so that an out-of-range value in a
//! hand-edited file is rejected by [`ConnectionSettings::from_stored`]
//! instead of failing the whole parse.
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` take the value of
//! `some_fn()` when missing from the file, so a first run (no file at all)
//! and an older file both load cleanly.

use std::path::{Path, PathBuf};

use mcr_core::domain::scan::DEFAULT_SCAN_CONCURRENCY;
use mcr_core::ConnectionSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::manage_settings::{SettingsStore, StoreError};

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Failures while reading or writing `config.toml` and `input-cache.toml`.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// Reading or writing a file failed.
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the expected shape.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The value could not be serialized to TOML.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl From<StorageError> for StoreError {
    fn from(e: StorageError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<StoredConnection>,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Raw persisted connection values; validated on read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoredConnection {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default)]
    pub token: String,
}

/// General client behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Maximum number of concurrent probes during a host scan.
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_scan_concurrency() -> usize {
    DEFAULT_SCAN_CONCURRENCY
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            scan_concurrency: default_scan_concurrency(),
        }
    }
}

impl AppConfig {
    /// The saved connection, if present and valid.
    pub fn connection_settings(&self) -> Option<ConnectionSettings> {
        let stored = self.connection.as_ref()?;
        ConnectionSettings::from_stored(&stored.host, stored.port, &stored.token)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate config directory.
///
/// # Errors
///
/// Returns [`StorageError::NoPlatformConfigDir`] when the base directory
/// cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, StorageError> {
    platform_config_dir().ok_or(StorageError::NoPlatformConfigDir)
}

/// Loads `AppConfig` from `dir`, returning the default config if the file
/// does not yet exist.
///
/// # Errors
///
/// Returns [`StorageError::Io`] for file-system errors other than "not
/// found", and [`StorageError::Parse`] if the TOML is malformed.
pub fn load_config(dir: &Path) -> Result<AppConfig, StorageError> {
    read_toml(&dir.join(CONFIG_FILE_NAME))
}

/// Persists `config` into `dir`, creating the directory if needed.
///
/// # Errors
///
/// Returns [`StorageError::Io`] for file-system failures or
/// [`StorageError::Serialize`] if serialization fails.
pub fn save_config(dir: &Path, config: &AppConfig) -> Result<(), StorageError> {
    write_toml(&dir.join(CONFIG_FILE_NAME), config)
}

/// Reads a TOML file, yielding `T::default()` when the file is missing.
pub(crate) fn read_toml<T>(path: &Path) -> Result<T, StorageError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(source) => Err(StorageError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `value` as pretty TOML, creating parent directories.
pub(crate) fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| StorageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // Roaming profile, usually under AppData
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MonitorControlRemote"))
    }

    #[cfg(target_os = "linux")]
    {
        // Honour XDG first, then fall back to the home dotdir
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("monitorcontrol-remote"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MonitorControlRemote")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── SettingsStore ─────────────────────────────────────────────────────────────

/// [`SettingsStore`] backed by `config.toml`.
///
/// Saving rewrites only the `[connection]` section; the `[client]` section
/// is preserved.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    dir: PathBuf,
}

impl FileSettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn update(&self, connection: Option<StoredConnection>) -> Result<(), StoreError> {
        let mut config = load_config(&self.dir)?;
        config.connection = connection;
        save_config(&self.dir, &config)?;
        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    fn read(&self) -> Option<ConnectionSettings> {
        match load_config(&self.dir) {
            Ok(config) => {
                let settings = config.connection_settings();
                if settings.is_none() && config.connection.is_some() {
                    debug!("stored connection settings are incomplete or invalid");
                }
                settings
            }
            Err(e) => {
                warn!("could not read connection settings: {e}");
                None
            }
        }
    }

    fn save(&self, settings: &ConnectionSettings) -> Result<(), StoreError> {
        self.update(Some(StoredConnection {
            host: settings.host.clone(),
            port: Some(i64::from(settings.port)),
            token: settings.token.clone(),
        }))
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.update(None)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("mcr-config-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_default_config_has_info_level_and_default_concurrency() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.client.log_level, "info");
        assert_eq!(cfg.client.scan_concurrency, 64);
        assert!(cfg.connection.is_none());
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = temp_dir();

        let cfg = load_config(&dir).expect("load");

        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let cfg: AppConfig = toml::from_str("[client]\nscan_concurrency = 8\n").expect("parse");

        assert_eq!(cfg.client.scan_concurrency, 8);
        assert_eq!(cfg.client.log_level, "info");
    }

    #[test]
    fn test_settings_store_round_trip_preserves_client_section() {
        // Arrange
        let dir = temp_dir();
        let mut cfg = AppConfig::default();
        cfg.client.log_level = "debug".to_string();
        save_config(&dir, &cfg).expect("seed");
        let store = FileSettingsStore::new(&dir);
        let settings = ConnectionSettings {
            host: "192.168.1.20".to_string(),
            port: 51423,
            token: "tok".to_string(),
        };

        // Act
        store.save(&settings).expect("save");
        let read_back = store.read();

        // Assert
        assert_eq!(read_back, Some(settings));
        assert_eq!(load_config(&dir).expect("load").client.log_level, "debug");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_out_of_range_stored_port_reads_as_absent() {
        // Arrange
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(
            dir.join(CONFIG_FILE_NAME),
            "[connection]\nhost = \"10.0.0.2\"\nport = 80\ntoken = \"t\"\n",
        )
        .expect("write");

        // Act
        let read_back = FileSettingsStore::new(&dir).read();

        // Assert
        assert_eq!(read_back, None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_clear_removes_connection() {
        let dir = temp_dir();
        let store = FileSettingsStore::new(&dir);
        store
            .save(&ConnectionSettings {
                host: "h".to_string(),
                port: 2000,
                token: "t".to_string(),
            })
            .expect("save");

        store.clear().expect("clear");

        assert_eq!(store.read(), None);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
