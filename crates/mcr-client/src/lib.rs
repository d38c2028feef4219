//! mcr-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does mcr-client do? (for beginners)
//!
//! The client remote-controls the displays attached to a Mac that runs the
//! MonitorControl HTTP API.  It:
//!
//! 1. Finds the Mac on the local network by probing every address of the
//!    machine's private /24 subnets for the service's health signature.
//! 2. Stores the chosen host, port, and bearer token in a TOML config file.
//! 3. Checks `GET api/v1/health`, then loads the display list.
//! 4. Applies brightness and volume slider drags optimistically and sends
//!    each new value immediately, discarding any response that has been
//!    overtaken by a newer local value.
//! 5. Sends power and input-source commands one at a time per display and
//!    re-fetches the display list after each.
//!
//! Every change of state is published as a fresh snapshot on a
//! `tokio::sync::watch` channel; user-facing messages go out on a
//! `tokio::sync::broadcast` channel.

/// Application layer: use cases and the collaborator contracts they need.
pub mod application;

/// Infrastructure layer: HTTP, LAN probing, file storage, and the UI bridge.
pub mod infrastructure;
