//! Typed failures of remote API calls.
//!
//! Every call to the remote service resolves to `Result<T, ApiError>`.  The
//! four variants mirror the four ways a call can go wrong:
//!
//! | Variant          | Meaning                                                |
//! |------------------|--------------------------------------------------------|
//! | `Service`        | The service answered with a non-2xx status.            |
//! | `Transport`      | The request never completed (refused, reset, timeout). |
//! | `EmptyResponse`  | 2xx status but the body was absent or unparsable.      |
//! | `Validation`     | Rejected locally before any network call.              |
//!
//! The classification helpers on [`ApiError`] are the single place where the
//! retry and disconnect policies look at an error.

use thiserror::Error;

use super::messages::ApiErrorEnvelope;

/// Legacy error code the service uses for its upstream request timeout.
const LEGACY_TIMEOUT_CODE: &str = "bad_request";

/// Message fragment that identifies the legacy upstream timeout.
const LEGACY_TIMEOUT_MESSAGE: &str = "request timeout";

/// Dedicated error code for the upstream request timeout.
pub const UPSTREAM_TIMEOUT_CODE: &str = "request_timeout";

/// Structured rejection returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    /// HTTP status code of the response.
    pub http_status: u16,
    /// Machine-readable code from the error envelope, if one was parsed.
    pub code: Option<String>,
    /// Human-readable message from the envelope, or `HTTP {status} {reason}`.
    pub message: String,
    /// Displays the error refers to, when the service reports them.
    pub display_ids: Option<Vec<i64>>,
}

impl ServiceError {
    /// Builds a `ServiceError` from a raw error body.
    ///
    /// Falls back to `HTTP {status} {reason}` when the body is not a valid
    /// error envelope.
    pub fn from_body(http_status: u16, reason: &str, raw_body: &str) -> Self {
        match serde_json::from_str::<ApiErrorEnvelope>(raw_body) {
            Ok(envelope) => Self {
                http_status,
                code: Some(envelope.error.code),
                message: envelope.error.message,
                display_ids: envelope.error.display_ids,
            },
            Err(_) => Self {
                http_status,
                code: None,
                message: format!("HTTP {http_status} {reason}").trim_end().to_string(),
                display_ids: None,
            },
        }
    }

    fn code_is(&self, expected: &str) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case(expected))
    }
}

/// Low-level cause of a [`ApiError::Transport`] failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Nothing accepted the TCP connection.
    ConnectionRefused,
    /// The peer reset the connection or the pipe broke mid-request.
    ConnectionReset,
    /// The response stream ended before the message was complete.
    UnexpectedEof,
    /// A connect, read, or whole-call timeout fired.
    Timeout,
    /// Any other I/O or protocol failure.
    Other,
}

/// Error type for every remote API operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The service rejected the request.
    #[error("HTTP {}: {}", .0.http_status, .0.message)]
    Service(ServiceError),

    /// The request did not complete at the transport level.
    #[error("transport error ({kind:?}): {message}")]
    Transport { kind: TransportKind, message: String },

    /// A successful status arrived without a usable body.
    #[error("response body is empty (HTTP {status})")]
    EmptyResponse { status: u16 },

    /// Local input was out of domain; no request was sent.
    #[error("invalid request: {0}")]
    Validation(String),
}

impl ApiError {
    /// Convenience constructor for transport failures.
    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        ApiError::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Returns the HTTP status of a service error.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ApiError::Service(e) => Some(e.http_status),
            _ => None,
        }
    }

    /// Returns `true` for the transport failures that may be retried once:
    /// connection refused, connection reset / broken pipe, unexpected end of stream.
    pub fn is_transient_transport(&self) -> bool {
        matches!(
            self,
            ApiError::Transport {
                kind: TransportKind::ConnectionRefused
                    | TransportKind::ConnectionReset
                    | TransportKind::UnexpectedEof,
                ..
            }
        )
    }

    /// Returns `true` when the service reports that its own upstream request
    /// timed out.
    ///
    /// Recognises the dedicated `request_timeout` code and the legacy shape
    /// (HTTP 400, code `bad_request`, message containing "request timeout").
    pub fn is_upstream_timeout(&self) -> bool {
        let ApiError::Service(e) = self else {
            return false;
        };
        if e.code_is(UPSTREAM_TIMEOUT_CODE) {
            return true;
        }
        e.http_status == 400
            && e.code_is(LEGACY_TIMEOUT_CODE)
            && e.message.to_ascii_lowercase().contains(LEGACY_TIMEOUT_MESSAGE)
    }

    /// Returns `true` when the error means the connection can no longer be
    /// trusted: authentication failure (401), service unavailable (503), or
    /// any transport failure.
    pub fn should_disconnect(&self) -> bool {
        match self {
            ApiError::Service(e) => matches!(e.http_status, 401 | 503),
            ApiError::Transport { .. } => true,
            ApiError::EmptyResponse { .. } | ApiError::Validation(_) => false,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn service(status: u16, code: Option<&str>, message: &str) -> ApiError {
        ApiError::Service(ServiceError {
            http_status: status,
            code: code.map(str::to_string),
            message: message.to_string(),
            display_ids: None,
        })
    }

    #[test]
    fn test_from_body_parses_envelope() {
        // Arrange
        let body = r#"{"error":{"code":"unauthorized","message":"bad token"}}"#;

        // Act
        let err = ServiceError::from_body(401, "Unauthorized", body);

        // Assert
        assert_eq!(err.code.as_deref(), Some("unauthorized"));
        assert_eq!(err.message, "bad token");
    }

    #[test]
    fn test_from_body_falls_back_to_status_line() {
        let err = ServiceError::from_body(502, "Bad Gateway", "<html>oops</html>");

        assert_eq!(err.code, None);
        assert_eq!(err.message, "HTTP 502 Bad Gateway");
    }

    #[test]
    fn test_legacy_upstream_timeout_is_recognised_case_insensitively() {
        let err = service(400, Some("bad_request"), "Upstream Request Timeout after 5s");
        assert!(err.is_upstream_timeout());
    }

    #[test]
    fn test_dedicated_timeout_code_is_recognised() {
        assert!(service(504, Some("request_timeout"), "slow").is_upstream_timeout());
    }

    #[test]
    fn test_other_bad_requests_are_not_upstream_timeouts() {
        assert!(!service(400, Some("bad_request"), "value out of range").is_upstream_timeout());
        assert!(!service(500, Some("bad_request"), "request timeout").is_upstream_timeout());
        assert!(!ApiError::transport(TransportKind::Timeout, "t").is_upstream_timeout());
    }

    #[test]
    fn test_transient_transport_classification() {
        assert!(ApiError::transport(TransportKind::ConnectionRefused, "").is_transient_transport());
        assert!(ApiError::transport(TransportKind::ConnectionReset, "").is_transient_transport());
        assert!(ApiError::transport(TransportKind::UnexpectedEof, "").is_transient_transport());
        assert!(!ApiError::transport(TransportKind::Timeout, "").is_transient_transport());
        assert!(!ApiError::transport(TransportKind::Other, "").is_transient_transport());
        assert!(!service(503, None, "down").is_transient_transport());
    }

    #[test]
    fn test_should_disconnect_for_auth_unavailable_and_transport() {
        assert!(service(401, Some("unauthorized"), "x").should_disconnect());
        assert!(service(503, None, "x").should_disconnect());
        assert!(ApiError::transport(TransportKind::Other, "x").should_disconnect());
        assert!(!service(400, None, "x").should_disconnect());
        assert!(!ApiError::EmptyResponse { status: 200 }.should_disconnect());
        assert!(!ApiError::Validation("x".into()).should_disconnect());
    }
}
