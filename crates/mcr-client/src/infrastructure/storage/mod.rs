//! File-backed storage adapters.

pub mod config;
pub mod input_cache;
pub mod mock;
