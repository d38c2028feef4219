//! Protocol module containing the REST message types and the error taxonomy.

pub mod error;
pub mod messages;

pub use error::{ApiError, ServiceError, TransportKind};
pub use messages::*;
