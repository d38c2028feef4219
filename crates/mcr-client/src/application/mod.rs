//! Application layer use cases for the remote client.
//!
//! # What use cases does the client have?
//!
//! - **`dispatch_commands`** – Owns the home-screen state (connection status,
//!   displays, global sliders).  Turns user intents into remote API calls,
//!   applies slider changes optimistically, and drops responses that a newer
//!   local value has already overtaken.
//!
//! - **`scan_hosts`** – Probes every candidate address on the LAN for the
//!   service's health signature with bounded concurrency and ranks the hits.
//!
//! - **`manage_settings`** – Drives the connection settings dialog: draft
//!   editing, validation, automatic and manual host scans, and saving.
//!
//! - **`notify`** / **`snapshot`** – The two one-way channels the use cases
//!   publish through: user-facing messages and copy-on-write state snapshots.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod dispatch_commands;
pub mod manage_settings;
pub mod notify;
pub mod scan_hosts;
pub mod snapshot;

/// Locks a std mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
