//! ManageSettingsUseCase: the connection settings dialog and its host scan.
//!
//! The [`SettingsController`] owns the dialog's [`SettingsState`]: the draft
//! being edited, per-field validation errors, and the state of the LAN scan
//! that helps the user find the host.
//!
//! # Scan lifecycle (for beginners)
//!
//! ```text
//!  open() ──► auto scan (once per opening)
//!                │
//!                ├── 0 hosts  ──► scan_error, host untouched
//!                ├── 1 host   ──► draft.host filled
//!                └── 2+ hosts ──► picker shown
//!
//!  dismiss() / save() ──► running scan aborted, late results ignored
//! ```
//!
//! Each scan gets a generation number.  A result is applied only when its
//! generation is still current and the dialog is still open, so a scan that
//! finishes after the dialog closed changes nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mcr_core::{
    ConnectionSettings, DisplayId, InputSource, ScannedHostCandidate, SettingsDraft,
    SettingsValidation,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatch_commands::DispatchEngine;
use super::lock;
use super::notify::{Notifier, UserMessage};
use super::scan_hosts::{HostScanner, ScanError};
use super::snapshot::StateStore;

/// Shown when a scan found nothing.
pub const NO_HOST_FOUND: &str =
    "No reachable host found; make sure the Mac is on the same LAN and the Remote HTTP API is enabled";

/// Shown when the scan task itself failed.
pub const SCAN_FAILED: &str = "Scan failed, try again later";

// ── Store contracts ───────────────────────────────────────────────────────────

/// Failure of a persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Persists the single active connection.
pub trait SettingsStore: Send + Sync {
    /// Returns the saved settings, or `None` when nothing valid is stored.
    fn read(&self) -> Option<ConnectionSettings>;

    fn save(&self, settings: &ConnectionSettings) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

/// Remembers the last known input source per display, scoped by connection.
pub trait InputCacheStore: Send + Sync {
    fn read_for_connection(&self, host: &str, port: u16) -> HashMap<DisplayId, InputSource>;

    fn save(
        &self,
        host: &str,
        port: u16,
        display_id: DisplayId,
        input: &InputSource,
    ) -> Result<(), StoreError>;
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Everything the settings dialog renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsState {
    pub is_open: bool,
    pub draft: SettingsDraft,
    pub validation: SettingsValidation,
    pub is_scanning: bool,
    /// Ranked scan matches from the latest scan.
    pub candidates: Vec<ScannedHostCandidate>,
    pub show_picker: bool,
    pub scan_error: Option<String>,
    /// The automatic scan for the current opening has already started.
    pub auto_scan_ran: bool,
}

impl SettingsState {
    fn closed(draft: SettingsDraft) -> Self {
        Self {
            draft,
            ..Self::default()
        }
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ScanSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

struct ControllerInner {
    state: StateStore<SettingsState>,
    store: Arc<dyn SettingsStore>,
    scanner: Arc<dyn HostScanner>,
    engine: DispatchEngine,
    notifier: Notifier,
    scan: Mutex<ScanSlot>,
}

/// Drives the settings dialog and hands saved settings to the engine.
#[derive(Clone)]
pub struct SettingsController {
    inner: Arc<ControllerInner>,
}

impl SettingsController {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        scanner: Arc<dyn HostScanner>,
        engine: DispatchEngine,
        notifier: Notifier,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                state: StateStore::new(SettingsState::default()),
                store,
                scanner,
                engine,
                notifier,
                scan: Mutex::new(ScanSlot::default()),
            }),
        }
    }

    pub fn state(&self) -> SettingsState {
        self.inner.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SettingsState> {
        self.inner.state.subscribe()
    }

    /// Startup: connects with the saved settings, or opens the dialog when
    /// there are none.  Returns `true` when a connection was started.
    pub fn bootstrap(&self) -> bool {
        match self.inner.store.read() {
            Some(settings) => {
                info!(host = %settings.host, port = settings.port, "using saved connection settings");
                self.inner
                    .state
                    .update(|_| SettingsState::closed(settings.to_draft()));
                self.inner.engine.connect(settings);
                true
            }
            None => {
                info!("no saved connection settings");
                self.inner.engine.mark_unconfigured();
                self.open();
                false
            }
        }
    }

    /// Opens the dialog seeded from the current settings and starts the
    /// automatic scan.
    pub fn open(&self) {
        self.cancel_scan();
        let draft = self
            .inner
            .engine
            .current_settings()
            .map(|s| s.to_draft())
            .unwrap_or_default();
        self.inner.state.update(|_| SettingsState {
            is_open: true,
            draft,
            ..SettingsState::default()
        });
        self.request_scan(false);
    }

    /// Closes the dialog without saving.
    pub fn dismiss(&self) {
        self.cancel_scan();
        self.inner
            .state
            .update(|s| SettingsState::closed(s.draft.clone()));
    }

    pub fn update_host(&self, host: &str) {
        self.edit(|draft| draft.host = host.to_string());
    }

    pub fn update_port(&self, port: &str) {
        self.edit(|draft| draft.port = port.to_string());
    }

    pub fn update_token(&self, token: &str) {
        self.edit(|draft| draft.token = token.to_string());
    }

    fn edit(&self, apply: impl FnOnce(&mut SettingsDraft)) {
        self.inner.state.update(|s| {
            let mut next = s.clone();
            apply(&mut next.draft);
            next.validation = SettingsValidation::default();
            next.scan_error = None;
            next
        });
    }

    /// Starts a LAN scan while the dialog is open.  A `manual` scan replaces
    /// any scan still running; the automatic scan runs at most once per
    /// opening and never interrupts another scan.  Returns `true` when a scan
    /// was started.
    pub fn request_scan(&self, manual: bool) -> bool {
        let current = self.inner.state.snapshot();
        if !current.is_open || (!manual && (current.is_scanning || current.auto_scan_ran)) {
            debug!(manual, "scan request ignored");
            return false;
        }

        let mut slot = lock(&self.inner.scan);
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;

        self.inner.state.update(|s| SettingsState {
            is_scanning: true,
            candidates: Vec::new(),
            show_picker: false,
            scan_error: None,
            auto_scan_ran: true,
            ..s.clone()
        });

        let token = current.draft.token.trim().to_string();
        let preferred = current.draft.host.trim().to_string();
        let inner = Arc::clone(&self.inner);
        slot.handle = Some(tokio::spawn(async move {
            let preferred = (!preferred.is_empty()).then_some(preferred.as_str());
            let result = inner.scanner.scan(&token, preferred).await;
            inner.apply_scan_result(generation, manual, result);
        }));
        info!(manual, "host scan started");
        true
    }

    /// Fills the draft host with a picked candidate and closes the picker.
    pub fn select_scan_result(&self, host: &str) {
        let host = host.trim().to_string();
        self.inner.state.update(|s| {
            let mut next = s.clone();
            next.draft.host = host.clone();
            next.validation.host_error = None;
            next.show_picker = false;
            next
        });
        self.inner.notifier.notify(UserMessage::HostFilled(host));
    }

    pub fn dismiss_picker(&self) {
        self.inner.state.update(|s| SettingsState {
            show_picker: false,
            ..s.clone()
        });
    }

    /// Validates and persists the draft, closes the dialog, and reconnects.
    ///
    /// Returns `false` when validation or persistence failed; the dialog then
    /// stays open.
    pub fn save(&self) -> bool {
        self.cancel_scan();
        let draft = self.inner.state.snapshot().draft;
        let settings = match draft.validate() {
            Ok(settings) => settings,
            Err(validation) => {
                self.inner.state.update(|s| SettingsState {
                    validation: validation.clone(),
                    ..s.clone()
                });
                return false;
            }
        };

        if let Err(e) = self.inner.store.save(&settings) {
            warn!("failed to save connection settings: {e}");
            self.inner.notifier.notify(UserMessage::SettingsNotSaved);
            return false;
        }

        info!(host = %settings.host, port = settings.port, "connection settings saved");
        self.inner
            .state
            .update(|_| SettingsState::closed(settings.to_draft()));
        self.inner.engine.connect(settings);
        true
    }

    /// Waits for the running scan, if any, to finish.
    pub async fn join_scan(&self) {
        let handle = lock(&self.inner.scan).handle.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("scan task failed: {e}");
                }
            }
        }
    }

    fn cancel_scan(&self) {
        let mut slot = lock(&self.inner.scan);
        slot.generation += 1;
        if let Some(handle) = slot.handle.take() {
            debug!("cancelling host scan");
            handle.abort();
        }
        drop(slot);
        self.inner.state.update(|s| SettingsState {
            is_scanning: false,
            ..s.clone()
        });
    }
}

impl ControllerInner {
    fn apply_scan_result(
        &self,
        generation: u64,
        manual: bool,
        result: Result<Vec<ScannedHostCandidate>, ScanError>,
    ) {
        // Held until the result is published so a concurrent cancel cannot
        // slip in between the generation check and the state update.
        let slot = lock(&self.scan);
        if slot.generation != generation {
            debug!("dropping result of a superseded scan");
            return;
        }
        if !self.state.snapshot().is_open {
            debug!("dialog closed, dropping scan result");
            return;
        }

        match result {
            Ok(candidates) => {
                info!(found = candidates.len(), "scan result applied");
                let message = match candidates.as_slice() {
                    [] => None,
                    [only] => Some(UserMessage::HostAutoFilled(only.host.clone())),
                    _ => Some(UserMessage::MultipleHostsFound),
                };
                self.state.update(|s| {
                    let mut next = SettingsState {
                        is_scanning: false,
                        ..s.clone()
                    };
                    match candidates.as_slice() {
                        [] => next.scan_error = Some(NO_HOST_FOUND.to_string()),
                        [only] => {
                            next.draft.host = only.host.clone();
                            next.validation.host_error = None;
                        }
                        _ => next.show_picker = true,
                    }
                    next.candidates = candidates.clone();
                    next
                });
                if let Some(message) = message {
                    self.notifier.notify(message);
                }
            }
            Err(e) => {
                warn!("host scan failed: {e}");
                self.state.update(|s| SettingsState {
                    is_scanning: false,
                    scan_error: Some(SCAN_FAILED.to_string()),
                    ..s.clone()
                });
                if manual {
                    self.notifier.notify(UserMessage::ScanFailed);
                }
            }
        }
        drop(slot);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
