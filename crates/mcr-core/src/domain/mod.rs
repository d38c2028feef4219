//! Domain entities for the MonitorControl remote client.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of the application is the **domain**.  Domain code has
//! no imports from network libraries, file systems, or UI frameworks, so it can
//! be compiled and tested on any platform without external setup.
//!
//! Outer layers (application, infrastructure, UI bridge) depend on the domain;
//! the domain never depends on them.

/// UI-facing display model and capability flags.
pub mod display;

/// Pure folding of remote snapshots into [`display::Display`] values.
pub mod reducer;

/// Host scan candidates: enumeration, response classification, ranking.
pub mod scan;

/// Connection settings, draft validation, and host normalisation.
pub mod settings;
