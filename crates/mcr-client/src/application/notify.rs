//! User-facing messages.
//!
//! Every error that reaches the user produces exactly one [`UserMessage`].
//! The front end subscribes to the [`Notifier`] and shows each message once
//! (a toast, a status line, or a line on stderr for the CLI).

use std::fmt;

use mcr_core::ApiError;
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered messages per subscriber before the oldest are dropped.
const MESSAGE_BUFFER: usize = 32;

/// A message for the user, rendered through its `Display` impl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMessage {
    /// HTTP 401: the token was rejected.
    AuthFailed,
    /// HTTP 503: the service is up but cannot serve requests right now.
    ServiceUnavailable,
    /// The service's upstream request timed out, usually from slider spam.
    RateLimited,
    /// The request never completed at the transport level.
    ConnectionFailed,
    /// The service's own error message.
    Api(String),
    /// A service error without a usable message.
    RequestFailed(u16),
    /// Any other failure.
    OperationFailed,
    /// Local input was rejected before any request was sent.
    InvalidInput(String),
    ConfigureFirst,
    NotConnected,
    SettingsNotSaved,
    HostFilled(String),
    HostAutoFilled(String),
    MultipleHostsFound,
    ScanFailed,
}

impl fmt::Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserMessage::AuthFailed => write!(f, "Invalid token, check the connection settings"),
            UserMessage::ServiceUnavailable => {
                write!(f, "Service temporarily unavailable, try again later")
            }
            UserMessage::RateLimited => write!(
                f,
                "Requests are too frequent, drag the brightness or volume slider more slowly"
            ),
            UserMessage::ConnectionFailed => {
                write!(f, "Connection failed, check the host address and the network")
            }
            UserMessage::Api(message) => write!(f, "{message}"),
            UserMessage::RequestFailed(status) => write!(f, "Request failed ({status})"),
            UserMessage::OperationFailed => write!(f, "Operation failed, try again later"),
            UserMessage::InvalidInput(message) => write!(f, "{message}"),
            UserMessage::ConfigureFirst => write!(f, "Configure the connection first"),
            UserMessage::NotConnected => write!(f, "Not connected"),
            UserMessage::SettingsNotSaved => write!(f, "Could not save the connection settings"),
            UserMessage::HostFilled(host) => write!(f, "Host address filled: {host}"),
            UserMessage::HostAutoFilled(host) => {
                write!(f, "Host address filled automatically: {host}")
            }
            UserMessage::MultipleHostsFound => {
                write!(f, "Several hosts found, choose the target device")
            }
            UserMessage::ScanFailed => write!(f, "Automatic scan failed, try again later"),
        }
    }
}

/// Maps an API failure to the single message the user sees for it.
pub fn message_for(error: &ApiError) -> UserMessage {
    match error {
        ApiError::Service(e) if e.http_status == 401 => UserMessage::AuthFailed,
        ApiError::Service(e) if e.http_status == 503 => UserMessage::ServiceUnavailable,
        ApiError::Service(_) if error.is_upstream_timeout() => UserMessage::RateLimited,
        ApiError::Service(e) if !e.message.trim().is_empty() => UserMessage::Api(e.message.clone()),
        ApiError::Service(e) => UserMessage::RequestFailed(e.http_status),
        ApiError::Transport { .. } => UserMessage::ConnectionFailed,
        ApiError::EmptyResponse { .. } => UserMessage::Api(error.to_string()),
        ApiError::Validation(message) => UserMessage::InvalidInput(message.clone()),
    }
}

/// Fan-out channel for [`UserMessage`]s.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<UserMessage>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(MESSAGE_BUFFER);
        Self { tx }
    }

    /// Publishes a message.  Messages sent while nobody listens are dropped.
    pub fn notify(&self, message: UserMessage) {
        debug!(%message, "user message");
        let _ = self.tx.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserMessage> {
        self.tx.subscribe()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mcr_core::{ServiceError, TransportKind};

    fn service(status: u16, code: Option<&str>, message: &str) -> ApiError {
        ApiError::Service(ServiceError {
            http_status: status,
            code: code.map(str::to_string),
            message: message.to_string(),
            display_ids: None,
        })
    }

    #[test]
    fn test_status_classes_map_to_fixed_messages() {
        assert_eq!(message_for(&service(401, Some("unauthorized"), "x")), UserMessage::AuthFailed);
        assert_eq!(message_for(&service(503, None, "x")), UserMessage::ServiceUnavailable);
        assert_eq!(
            message_for(&service(400, Some("bad_request"), "request timeout")),
            UserMessage::RateLimited
        );
    }

    #[test]
    fn test_service_message_is_passed_through_or_replaced_by_status() {
        assert_eq!(
            message_for(&service(404, Some("display_not_found"), "Display 9 not found")),
            UserMessage::Api("Display 9 not found".to_string())
        );
        assert_eq!(message_for(&service(500, None, "  ")), UserMessage::RequestFailed(500));
    }

    #[test]
    fn test_transport_and_validation_messages() {
        assert_eq!(
            message_for(&ApiError::transport(TransportKind::Timeout, "slow")),
            UserMessage::ConnectionFailed
        );
        assert_eq!(
            message_for(&ApiError::Validation("bad code".into())).to_string(),
            "bad code"
        );
    }

    #[tokio::test]
    async fn test_notifier_delivers_to_subscribers() {
        // Arrange
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        // Act
        notifier.notify(UserMessage::NotConnected);

        // Assert
        assert_eq!(rx.recv().await.expect("message"), UserMessage::NotConnected);
    }
}
