//! JSON message types exchanged with the MonitorControl HTTP API (v1).
//!
//! Field names follow the service's camelCase JSON.  Optional fields carry
//! `#[serde(default)]` so that older service builds which omit them (for
//! example `volume` or the whole `input` block) still deserialize.

use serde::{Deserialize, Serialize};

// ── Endpoint paths ────────────────────────────────────────────────────────────

/// Relative path of the unauthenticated-friendly health endpoint.
pub const HEALTH_PATH: &str = "api/v1/health";

/// Relative path of the display list endpoint.
pub const DISPLAYS_PATH: &str = "api/v1/displays";

/// Relative path of the "set brightness on every display" endpoint.
pub const ALL_BRIGHTNESS_PATH: &str = "api/v1/displays/brightness";

/// Relative path of the "set volume on every display" endpoint.
pub const ALL_VOLUME_PATH: &str = "api/v1/displays/volume";

/// Relative path of the "power every display" endpoint.
pub const ALL_POWER_PATH: &str = "api/v1/displays/power";

/// Relative path of `POST api/v1/displays/{id}/brightness`.
pub fn display_brightness_path(display_id: i64) -> String {
    format!("{DISPLAYS_PATH}/{display_id}/brightness")
}

/// Relative path of `POST api/v1/displays/{id}/volume`.
pub fn display_volume_path(display_id: i64) -> String {
    format!("{DISPLAYS_PATH}/{display_id}/volume")
}

/// Relative path of `POST api/v1/displays/{id}/power`.
pub fn display_power_path(display_id: i64) -> String {
    format!("{DISPLAYS_PATH}/{display_id}/power")
}

/// Relative path of `POST api/v1/displays/{id}/input`.
pub fn display_input_path(display_id: i64) -> String {
    format!("{DISPLAYS_PATH}/{display_id}/input")
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// Body of `GET api/v1/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Capability flags advertised per display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayCapabilities {
    pub brightness: bool,
    #[serde(default)]
    pub volume: bool,
    pub power: bool,
}

/// One selectable input source (DDC/CI input code plus a label).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSourceStatus {
    pub code: i32,
    pub name: String,
}

/// Input-source block of a display record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInputStatus {
    #[serde(default)]
    pub supported: bool,
    /// The service could only guess the current input (many monitors do not
    /// report it reliably over DDC/CI).
    #[serde(default)]
    pub best_effort: bool,
    #[serde(default)]
    pub current: Option<InputSourceStatus>,
    #[serde(default)]
    pub available: Vec<InputSourceStatus>,
}

/// A display as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayStatus {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub is_virtual: bool,
    /// Placeholder displays created by the service; never shown in the UI.
    #[serde(default)]
    pub is_dummy: bool,
    pub brightness: i32,
    #[serde(default)]
    pub volume: Option<i32>,
    pub power_state: String,
    pub capabilities: DisplayCapabilities,
    #[serde(default)]
    pub input: DisplayInputStatus,
}

/// Body of `GET api/v1/displays` and of the "all displays" slider endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaysResponse {
    pub displays: Vec<DisplayStatus>,
}

/// Body of the single-display slider and input endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleDisplayResponse {
    pub display: DisplayStatus,
}

/// Body of `POST api/v1/displays/{id}/power`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinglePowerResponse {
    pub display_id: i64,
    pub requested_state: PowerState,
    pub accepted: bool,
}

/// Body of `POST api/v1/displays/power`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllPowerResponse {
    pub requested_state: PowerState,
    #[serde(default)]
    pub accepted_display_ids: Vec<i64>,
}

/// Error envelope returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

/// Machine-readable error details inside [`ApiErrorEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub display_ids: Option<Vec<i64>>,
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// Body of the brightness and volume endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRequest {
    pub value: u8,
}

/// Requested power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Maps a UI toggle to a power state.
    pub fn from_on(turn_on: bool) -> Self {
        if turn_on {
            PowerState::On
        } else {
            PowerState::Off
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }
}

/// Body of the power endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerRequest {
    pub state: PowerState,
}

/// Body of `POST api/v1/displays/{id}/input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRequest {
    pub code: u8,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
