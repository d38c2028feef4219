//! # mcr-core
//!
//! Shared library for the MonitorControl remote client containing the domain
//! model, the REST wire types, and the pure state reducer.
//!
//! This crate has zero dependencies on sockets, file systems, or async
//! runtimes.  Everything in here can be unit-tested without a network.
//!
//! # Architecture overview (for beginners)
//!
//! The client remote-controls the displays attached to a Mac running the
//! MonitorControl HTTP API.  It finds that Mac on the LAN, authenticates with
//! a bearer token, and then changes brightness, volume, power, and input
//! source of each display.
//!
//! This crate (`mcr-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – The JSON shapes exchanged with the remote service and
//!   the typed [`ApiError`] taxonomy every remote call can fail with.
//!
//! - **`domain`** – Pure rules: connection settings and their validation,
//!   the UI-facing [`Display`] model, the reducer that folds remote snapshots
//!   into that model, and the host-scan candidate enumeration and ranking.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `mcr_core::Display` instead of `mcr_core::domain::display::Display`.
pub use domain::display::{Capabilities, Display, DisplayId, InputSource};
pub use domain::scan::{ScanMatchKind, ScannedHostCandidate};
pub use domain::settings::{ConnectionSettings, SettingsDraft, SettingsValidation};
pub use protocol::error::{ApiError, ServiceError, TransportKind};
pub use protocol::messages::{DisplayStatus, PowerState};
