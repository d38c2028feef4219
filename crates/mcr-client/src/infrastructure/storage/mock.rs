//! In-memory stores for unit and integration tests.
//!
//! Both stores keep their data in a `Mutex` so they can be shared through an
//! `Arc` between the engine, the settings controller, and the test body.
//! [`InMemorySettingsStore::fail_writes`] makes `save` and `clear` fail so
//! error paths can be exercised without a read-only file system.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use mcr_core::domain::settings::connection_key;
use mcr_core::{ConnectionSettings, DisplayId, InputSource};

use crate::application::lock;
use crate::application::manage_settings::{InputCacheStore, SettingsStore, StoreError};

/// Settings store holding at most one connection in memory.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    settings: Mutex<Option<ConnectionSettings>>,
    fail_writes: AtomicBool,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `settings`.
    pub fn with_settings(settings: ConnectionSettings) -> Self {
        Self {
            settings: Mutex::new(Some(settings)),
            ..Self::default()
        }
    }

    /// When `true`, `save` and `clear` return [`StoreError::Backend`].
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("mock failure".into()));
        }
        Ok(())
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn read(&self) -> Option<ConnectionSettings> {
        lock(&self.settings).clone()
    }

    fn save(&self, settings: &ConnectionSettings) -> Result<(), StoreError> {
        self.check_writable()?;
        *lock(&self.settings) = Some(settings.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.check_writable()?;
        *lock(&self.settings) = None;
        Ok(())
    }
}

/// Input cache keyed like the file store: normalised `host:port`, then id.
#[derive(Debug, Default)]
pub struct InMemoryInputCacheStore {
    entries: Mutex<HashMap<String, HashMap<DisplayId, InputSource>>>,
}

impl InMemoryInputCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputCacheStore for InMemoryInputCacheStore {
    fn read_for_connection(&self, host: &str, port: u16) -> HashMap<DisplayId, InputSource> {
        lock(&self.entries)
            .get(&connection_key(host, port))
            .cloned()
            .unwrap_or_default()
    }

    fn save(
        &self,
        host: &str,
        port: u16,
        display_id: DisplayId,
        input: &InputSource,
    ) -> Result<(), StoreError> {
        lock(&self.entries)
            .entry(connection_key(host, port))
            .or_default()
            .insert(display_id, input.clone());
        Ok(())
    }
}
