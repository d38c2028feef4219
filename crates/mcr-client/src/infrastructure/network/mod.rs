//! Network adapters.

pub mod api_client;
pub mod mock;
pub mod scanner;
