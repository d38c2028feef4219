//! Front-end bridge for the remote client.
//!
//! Exposes the application layer to a presentation layer (the bundled CLI, or
//! any UI shell) through two plain channels:
//!
//! ```text
//! front end                    ClientApp                 application layer
//! ─────────────────────────────────────────────────────────────────────────
//! UiIntent::ChangeSlider ───►  dispatch()  ───────────►  DispatchEngine
//! UiIntent::ScanHosts    ───►  dispatch()  ───────────►  SettingsController
//!                        ◄───  home_snapshot()  ◄──────  HomeState
//!                        ◄───  settings_snapshot() ◄───  SettingsState
//! ```
//!
//! # DTOs (Data Transfer Objects)
//!
//! The application state types are internal and may change shape freely.  The
//! DTOs below are flat, serializable snapshots with stable field names, so a
//! front end can render them straight from JSON.  The bearer token never
//! appears in a DTO.
//!
//! # `CommandResult<T>`
//!
//! Every intent returns `CommandResult<T>`, a unified envelope:
//! ```json
//! { "success": true,  "data": true, "error": null }
//! { "success": false, "data": null, "error": "..." }
//! ```

use std::path::Path;
use std::sync::Arc;

use mcr_core::{Display, InputSource, ScanMatchKind, ScannedHostCandidate};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::application::dispatch_commands::{
    ConnectionStatus, DispatchEngine, HomeState, RefreshOutcome, RemoteClientFactory,
    SliderTarget,
};
use crate::application::manage_settings::{
    InputCacheStore, SettingsController, SettingsState, SettingsStore,
};
use crate::application::notify::{Notifier, UserMessage};
use crate::application::scan_hosts::{HostScanner, ScanError};
use crate::infrastructure::network::api_client::create_http_client;
use crate::infrastructure::network::scanner::lan_scanner;
use crate::infrastructure::storage::config::FileSettingsStore;
use crate::infrastructure::storage::input_cache::FileInputCacheStore;

// ── Intents ───────────────────────────────────────────────────────────────────

/// Everything a front end can ask the client to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiIntent {
    Refresh,
    OpenSettings,
    DismissSettings,
    EditHost(String),
    EditPort(String),
    EditToken(String),
    /// Manual "scan the LAN" button.
    ScanHosts,
    SelectScanResult(String),
    DismissPicker,
    SaveSettings,
    ChangeSlider { target: SliderTarget, value: i32 },
    FinishSlider(SliderTarget),
    SetDisplayPower { id: i64, on: bool },
    SelectInput { id: i64, code: i32, name: Option<String> },
    SetAllPower(bool),
}

// ── DTOs ──────────────────────────────────────────────────────────────────────

/// One display as rendered on the home screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayDto {
    pub id: i64,
    pub name: String,
    pub brightness: u8,
    pub volume: Option<u8>,
    pub power_on: bool,
    pub supports_brightness: bool,
    pub supports_volume: bool,
    pub supports_power: bool,
    pub supports_input: bool,
    pub current_input: Option<InputSource>,
    pub available_inputs: Vec<InputSource>,
    /// The current input comes from the local cache, not the service.
    pub input_from_cache: bool,
    pub is_virtual: bool,
    pub busy: bool,
}

impl From<&Display> for DisplayDto {
    fn from(d: &Display) -> Self {
        Self {
            id: d.id,
            name: d.name.clone(),
            brightness: d.brightness,
            volume: d.volume,
            power_on: d.power_on,
            supports_brightness: d.capabilities.brightness,
            supports_volume: d.capabilities.volume,
            supports_power: d.capabilities.power,
            supports_input: d.capabilities.input,
            current_input: d.current_input.clone(),
            available_inputs: d.available_inputs.clone(),
            input_from_cache: d.input_from_cache,
            is_virtual: d.is_virtual,
            busy: d.busy,
        }
    }
}

/// Home screen snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeStateDto {
    /// `"Disconnected"`, `"Connecting"`, or `"Connected"`.
    pub connection: String,
    pub is_loading: bool,
    pub is_refreshing: bool,
    pub global_brightness: u8,
    pub global_volume: u8,
    pub is_global_busy: bool,
    pub displays: Vec<DisplayDto>,
}

impl From<&HomeState> for HomeStateDto {
    fn from(s: &HomeState) -> Self {
        Self {
            connection: connection_label(s.connection).to_string(),
            is_loading: s.is_loading,
            is_refreshing: s.is_refreshing,
            global_brightness: s.global_brightness,
            global_volume: s.global_volume,
            is_global_busy: s.is_global_busy,
            displays: s.displays.iter().map(DisplayDto::from).collect(),
        }
    }
}

fn connection_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Disconnected => "Disconnected",
        ConnectionStatus::Connecting => "Connecting",
        ConnectionStatus::Connected => "Connected",
    }
}

/// One scan match in the host picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDto {
    pub host: String,
    pub latency_ms: u64,
    /// `"health_ok"` or `"unauthorized_signature"`.
    pub match_kind: String,
}

impl From<&ScannedHostCandidate> for CandidateDto {
    fn from(c: &ScannedHostCandidate) -> Self {
        let match_kind = match c.match_kind {
            ScanMatchKind::HealthOk => "health_ok",
            ScanMatchKind::UnauthorizedSignature => "unauthorized_signature",
        };
        Self {
            host: c.host.clone(),
            latency_ms: c.latency_ms,
            match_kind: match_kind.to_string(),
        }
    }
}

/// Settings dialog snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsStateDto {
    pub is_open: bool,
    pub host: String,
    pub port: String,
    pub has_token: bool,
    pub host_error: Option<String>,
    pub port_error: Option<String>,
    pub token_error: Option<String>,
    pub is_scanning: bool,
    pub candidates: Vec<CandidateDto>,
    pub show_picker: bool,
    pub scan_error: Option<String>,
}

impl From<&SettingsState> for SettingsStateDto {
    fn from(s: &SettingsState) -> Self {
        Self {
            is_open: s.is_open,
            host: s.draft.host.clone(),
            port: s.draft.port.clone(),
            has_token: !s.draft.token.trim().is_empty(),
            host_error: s.validation.host_error.clone(),
            port_error: s.validation.port_error.clone(),
            token_error: s.validation.token_error.clone(),
            is_scanning: s.is_scanning,
            candidates: s.candidates.iter().map(CandidateDto::from).collect(),
            show_picker: s.show_picker,
            scan_error: s.scan_error.clone(),
        }
    }
}

/// Outcome of one dispatched intent.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    /// Whether the intent was accepted.
    pub success: bool,
    /// Optional payload for accepted intents.
    pub data: Option<T>,
    /// Message shown to the user when the intent was rejected.
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Client application ────────────────────────────────────────────────────────

/// The wired-up client: dispatch engine plus settings controller sharing one
/// message channel.
#[derive(Clone)]
pub struct ClientApp {
    engine: DispatchEngine,
    settings: SettingsController,
    notifier: Notifier,
}

impl ClientApp {
    /// Wires the use cases around the given collaborators.
    pub fn new(
        factory: Arc<dyn RemoteClientFactory>,
        input_cache: Arc<dyn InputCacheStore>,
        settings_store: Arc<dyn SettingsStore>,
        scanner: Arc<dyn HostScanner>,
    ) -> Self {
        let notifier = Notifier::new();
        let engine = DispatchEngine::new(factory, input_cache, notifier.clone());
        let settings =
            SettingsController::new(settings_store, scanner, engine.clone(), notifier.clone());
        Self {
            engine,
            settings,
            notifier,
        }
    }

    /// Production wiring: HTTP client, LAN scanner, and TOML files in
    /// `config_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Setup`] if the probe HTTP client cannot be built.
    pub fn with_config_dir(config_dir: &Path, scan_concurrency: usize) -> Result<Self, ScanError> {
        Ok(Self::new(
            Arc::new(create_http_client),
            Arc::new(FileInputCacheStore::new(config_dir)),
            Arc::new(FileSettingsStore::new(config_dir)),
            Arc::new(lan_scanner(scan_concurrency)?),
        ))
    }

    pub fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    pub fn settings(&self) -> &SettingsController {
        &self.settings
    }

    pub fn messages(&self) -> broadcast::Receiver<UserMessage> {
        self.notifier.subscribe()
    }

    /// Connects with saved settings or opens the settings dialog.
    pub fn bootstrap(&self) -> bool {
        self.settings.bootstrap()
    }

    /// Handles one intent.  `data` is `true` when the intent started work
    /// or changed state, `false` when it was rejected or ignored.
    pub fn dispatch(&self, intent: UiIntent) -> CommandResult<bool> {
        let accepted = match intent {
            UiIntent::Refresh => match self.engine.refresh() {
                RefreshOutcome::Started => true,
                RefreshOutcome::NeedsSettings => {
                    self.settings.open();
                    false
                }
            },
            UiIntent::OpenSettings => {
                self.settings.open();
                true
            }
            UiIntent::DismissSettings => {
                self.settings.dismiss();
                true
            }
            UiIntent::EditHost(host) => {
                self.settings.update_host(&host);
                true
            }
            UiIntent::EditPort(port) => {
                self.settings.update_port(&port);
                true
            }
            UiIntent::EditToken(token) => {
                self.settings.update_token(&token);
                true
            }
            UiIntent::ScanHosts => self.settings.request_scan(true),
            UiIntent::SelectScanResult(host) => {
                self.settings.select_scan_result(&host);
                true
            }
            UiIntent::DismissPicker => {
                self.settings.dismiss_picker();
                true
            }
            UiIntent::SaveSettings => {
                if !self.settings.save() {
                    return CommandResult::err(save_failure(&self.settings.state()));
                }
                true
            }
            UiIntent::ChangeSlider { target, value } => self.engine.change_slider(target, value),
            UiIntent::FinishSlider(target) => self.engine.finish_slider(target),
            UiIntent::SetDisplayPower { id, on } => self.engine.set_display_power(id, on),
            UiIntent::SelectInput { id, code, name } => {
                self.engine.select_display_input(id, code, name)
            }
            UiIntent::SetAllPower(on) => self.engine.set_power_all(on),
        };
        CommandResult::ok(accepted)
    }

    /// Waits for the running scan and every pending command.
    pub async fn settle(&self) {
        self.settings.join_scan().await;
        self.engine.join_pending().await;
    }

    pub fn home_snapshot(&self) -> HomeStateDto {
        HomeStateDto::from(&self.engine.state())
    }

    pub fn settings_snapshot(&self) -> SettingsStateDto {
        SettingsStateDto::from(&self.settings.state())
    }
}

/// First validation error of a rejected save, or a generic message.
fn save_failure(state: &SettingsState) -> String {
    let v = &state.validation;
    v.host_error
        .clone()
        .or_else(|| v.port_error.clone())
        .or_else(|| v.token_error.clone())
        .unwrap_or_else(|| UserMessage::SettingsNotSaved.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatch_commands::{RemoteControlClient, SliderKind};
    use crate::application::scan_hosts::ConcurrentHostScanner;
    use crate::infrastructure::network::mock::{FixedCandidates, InMemoryRemoteControlClient};
    use crate::infrastructure::storage::mock::{InMemoryInputCacheStore, InMemorySettingsStore};
    use async_trait::async_trait;
    use mcr_core::protocol::messages::{DisplayCapabilities, DisplayInputStatus};
    use mcr_core::{ApiError, ConnectionSettings, DisplayStatus};

    struct NoHosts;

    #[async_trait]
    impl crate::application::scan_hosts::HostProber for NoHosts {
        async fn probe(&self, _host: &str, _token: &str) -> Option<ScannedHostCandidate> {
            None
        }
    }

    fn status(id: i64) -> DisplayStatus {
        DisplayStatus {
            id,
            name: format!("Display {id}"),
            friendly_name: String::new(),
            kind: "other".to_string(),
            is_virtual: false,
            is_dummy: false,
            brightness: 30,
            volume: None,
            power_state: "on".to_string(),
            capabilities: DisplayCapabilities {
                brightness: true,
                volume: false,
                power: true,
            },
            input: DisplayInputStatus::default(),
        }
    }

    fn app(store: InMemorySettingsStore) -> (ClientApp, Arc<InMemoryRemoteControlClient>) {
        let remote = Arc::new(InMemoryRemoteControlClient::new(vec![status(1)]));
        let shared = Arc::clone(&remote);
        let factory = move |_: &ConnectionSettings| -> Result<Arc<dyn RemoteControlClient>, ApiError> {
            Ok(Arc::clone(&shared) as Arc<dyn RemoteControlClient>)
        };
        let scanner = ConcurrentHostScanner::new(
            Arc::new(NoHosts),
            Arc::new(FixedCandidates(vec!["10.0.0.9".to_string()])),
        );
        let app = ClientApp::new(
            Arc::new(factory),
            Arc::new(InMemoryInputCacheStore::new()),
            Arc::new(store),
            Arc::new(scanner),
        );
        (app, remote)
    }

    fn saved() -> ConnectionSettings {
        ConnectionSettings {
            host: "10.0.0.9".to_string(),
            port: 51423,
            token: "tok".to_string(),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_with_saved_settings_connects() {
        // Arrange
        let (app, _remote) = app(InMemorySettingsStore::with_settings(saved()));

        // Act
        assert!(app.bootstrap());
        app.settle().await;

        // Assert
        let home = app.home_snapshot();
        assert_eq!(home.connection, "Connected");
        assert_eq!(home.displays.len(), 1);
        assert_eq!(home.global_brightness, 30);
        assert!(!app.settings_snapshot().is_open);
    }

    #[tokio::test]
    async fn test_refresh_without_settings_opens_settings() {
        let (app, _remote) = app(InMemorySettingsStore::new());

        let result = app.dispatch(UiIntent::Refresh);
        app.settle().await;

        assert!(result.success);
        assert_eq!(result.data, Some(false));
        let settings = app.settings_snapshot();
        assert!(settings.is_open);
        assert!(settings.scan_error.is_some());
    }

    #[tokio::test]
    async fn test_invalid_save_reports_first_field_error() {
        // Arrange
        let (app, _remote) = app(InMemorySettingsStore::new());
        app.dispatch(UiIntent::OpenSettings);
        app.dispatch(UiIntent::EditHost("10.0.0.9".into()));
        app.dispatch(UiIntent::EditPort("abc".into()));
        app.dispatch(UiIntent::EditToken("tok".into()));

        // Act
        let result = app.dispatch(UiIntent::SaveSettings);

        // Assert
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Port must be a number"));
    }

    #[tokio::test]
    async fn test_slider_intent_reaches_engine() {
        // Arrange
        let (app, remote) = app(InMemorySettingsStore::with_settings(saved()));
        app.bootstrap();
        app.settle().await;

        // Act
        let result = app.dispatch(UiIntent::ChangeSlider {
            target: SliderTarget::display(1, SliderKind::Brightness),
            value: 75,
        });
        app.settle().await;

        // Assert
        assert_eq!(result.data, Some(true));
        assert_eq!(app.home_snapshot().displays[0].brightness, 75);
        assert_eq!(remote.displays()[0].brightness, 75);
    }

    #[test]
    fn test_settings_dto_hides_token() {
        let mut state = SettingsState::default();
        state.draft.token = "s3cret".to_string();

        let json = serde_json::to_string(&SettingsStateDto::from(&state)).expect("json");

        assert!(!json.contains("s3cret"));
        assert!(json.contains("\"has_token\":true"));
    }
}
