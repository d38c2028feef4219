//! Infrastructure layer: adapters that talk to the outside world.
//!
//! Each submodule implements one of the contracts declared in
//! [`crate::application`] and ships an in-memory double next to it.

/// reqwest-based API client and LAN host prober.
pub mod network;

/// TOML-file settings store and input-source cache.
pub mod storage;

/// Front-end facing facade: intents in, JSON-friendly snapshots out.
pub mod ui_bridge;
