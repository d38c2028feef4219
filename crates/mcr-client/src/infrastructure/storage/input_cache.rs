//! File-backed input-source cache.
//!
//! Many monitors cannot report their active input over DDC/CI, so the client
//! remembers the last input it saw or selected for each display.  Entries are
//! scoped by connection (`host:port`, lower-cased) because display ids are
//! only unique per Mac.
//!
//! ```toml
//! [connections."192.168.1.20:51423"]
//! 1 = { code = 17, name = "HDMI-1" }
//! 2 = { code = 15, name = "DisplayPort-1" }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use mcr_core::domain::settings::connection_key;
use mcr_core::{DisplayId, InputSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::{read_toml, write_toml, StorageError};
use crate::application::lock;
use crate::application::manage_settings::{InputCacheStore, StoreError};

pub const INPUT_CACHE_FILE_NAME: &str = "input-cache.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct InputCacheFile {
    #[serde(default)]
    connections: BTreeMap<String, BTreeMap<String, CachedInput>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CachedInput {
    code: i64,
    #[serde(default)]
    name: String,
}

/// [`InputCacheStore`] persisted in `input-cache.toml`.
#[derive(Debug)]
pub struct FileInputCacheStore {
    path: PathBuf,
    /// Serialises read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileInputCacheStore {
    /// Store inside the config directory `dir`.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(INPUT_CACHE_FILE_NAME),
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<InputCacheFile, StorageError> {
        read_toml(&self.path)
    }
}

impl InputCacheStore for FileInputCacheStore {
    fn read_for_connection(&self, host: &str, port: u16) -> HashMap<DisplayId, InputSource> {
        let file = match self.load() {
            Ok(file) => file,
            Err(e) => {
                warn!("could not read input cache: {e}");
                return HashMap::new();
            }
        };
        let Some(entries) = file.connections.get(&connection_key(host, port)) else {
            return HashMap::new();
        };

        entries
            .iter()
            .filter_map(|(id, entry)| {
                let id: DisplayId = id.parse().ok()?;
                let Ok(code) = u8::try_from(entry.code) else {
                    debug!(display_id = id, code = entry.code, "skipping cached input with invalid code");
                    return None;
                };
                Some((id, InputSource::new(code, &entry.name)))
            })
            .collect()
    }

    fn save(
        &self,
        host: &str,
        port: u16,
        display_id: DisplayId,
        input: &InputSource,
    ) -> Result<(), StoreError> {
        let _guard = lock(&self.write_lock);
        let mut file = self.load()?;
        file.connections
            .entry(connection_key(host, port))
            .or_default()
            .insert(
                display_id.to_string(),
                CachedInput {
                    code: i64::from(input.code),
                    name: input.name.clone(),
                },
            );
        write_toml(&self.path, &file)?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("mcr-inputs-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_save_then_read_is_scoped_by_normalised_connection() {
        // Arrange
        let dir = temp_dir();
        let store = FileInputCacheStore::new(&dir);

        // Act
        store
            .save("http://MyMac.local/", 51423, 7, &InputSource::new(17, "HDMI-1"))
            .expect("save");

        // Assert
        let same = store.read_for_connection("mymac.local", 51423);
        assert_eq!(same.get(&7), Some(&InputSource::new(17, "HDMI-1")));
        assert!(store.read_for_connection("mymac.local", 51424).is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_codes_are_skipped_and_blank_names_read_as_unknown() {
        // Arrange
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(
            dir.join(INPUT_CACHE_FILE_NAME),
            concat!(
                "[connections.\"10.0.0.2:51423\"]\n",
                "1 = { code = 300, name = \"bogus\" }\n",
                "2 = { code = 15, name = \"  \" }\n",
                "x = { code = 3, name = \"VGA\" }\n",
            ),
        )
        .expect("write");

        // Act
        let cached = FileInputCacheStore::new(&dir).read_for_connection("10.0.0.2", 51423);

        // Assert
        assert_eq!(cached.len(), 1);
        assert_eq!(cached.get(&2), Some(&InputSource::new(15, "UNKNOWN-15")));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let store = FileInputCacheStore::new(&temp_dir());

        assert!(store.read_for_connection("10.0.0.2", 51423).is_empty());
    }
}
