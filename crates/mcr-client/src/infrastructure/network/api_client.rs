//! reqwest-based client for the MonitorControl HTTP API.
//!
//! Every call goes through [`HttpRemoteControlClient::call`], which:
//!
//! 1. Builds the request with `Accept: application/json` and, when the token
//!    is not blank, `Authorization: Bearer {token}`.
//! 2. Maps the outcome into [`ApiError`]:
//!    - non-2xx → [`ApiError::Service`] built from the error envelope,
//!    - 2xx with an empty or unparsable body → [`ApiError::EmptyResponse`],
//!    - no response at all → [`ApiError::Transport`] with a [`TransportKind`].
//! 3. Retries once, after [`TRANSPORT_RETRY_DELAY`], when the first attempt
//!    failed with connection refused, connection reset, or a truncated
//!    response.  Nothing else is retried here.
//!
//! # Finding the transport cause (for beginners)
//!
//! A `reqwest::Error` wraps the lower layers (hyper, then the OS socket).  The
//! useful `std::io::ErrorKind` sits somewhere down the `source()` chain, so
//! [`transport_kind`] walks that chain until it finds one.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcr_core::protocol::messages::{
    display_brightness_path, display_input_path, display_power_path, display_volume_path,
    AllPowerResponse, DisplaysResponse, HealthResponse, InputRequest, PowerRequest,
    SingleDisplayResponse, SinglePowerResponse, ValueRequest, ALL_BRIGHTNESS_PATH,
    ALL_POWER_PATH, ALL_VOLUME_PATH, DISPLAYS_PATH, HEALTH_PATH,
};
use mcr_core::{
    ApiError, ConnectionSettings, DisplayId, DisplayStatus, PowerState, ServiceError,
    TransportKind,
};
use reqwest::header::ACCEPT;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::application::dispatch_commands::RemoteControlClient;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before the single transport-level retry.
pub const TRANSPORT_RETRY_DELAY: Duration = Duration::from_millis(120);

/// Authenticated client bound to one [`ConnectionSettings`].
pub struct HttpRemoteControlClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for HttpRemoteControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the token.
        f.debug_struct("HttpRemoteControlClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpRemoteControlClient {
    /// Builds a client for `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the underlying HTTP client cannot be
    /// constructed (for example when the TLS backend fails to initialise).
    pub fn new(settings: &ConnectionSettings) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| ApiError::transport(TransportKind::Other, e.to_string()))?;
        Ok(Self {
            http,
            base_url: settings.base_url(),
            token: settings.token.trim().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    fn prepare(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(ACCEPT, "application/json");
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    /// Sends the request built by `build`, retrying once on a transient
    /// transport failure of the first attempt.
    async fn call<T, F>(&self, build: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        match self.send_once(build()).await {
            Err(e) if e.is_transient_transport() => {
                warn!("transient transport failure, retrying once: {e}");
                tokio::time::sleep(TRANSPORT_RETRY_DELAY).await;
                self.send_once(build()).await
            }
            other => other,
        }
    }

    async fn send_once<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.prepare(request).send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;
        debug!(status = status.as_u16(), bytes = body.len(), "response received");

        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("");
            return Err(ServiceError::from_body(status.as_u16(), reason, &body).into());
        }
        if body.trim().is_empty() {
            return Err(ApiError::EmptyResponse {
                status: status.as_u16(),
            });
        }
        serde_json::from_str(&body).map_err(|e| {
            debug!("unparsable success body: {e}");
            ApiError::EmptyResponse {
                status: status.as_u16(),
            }
        })
    }
}

/// [`RemoteClientFactory`](crate::application::dispatch_commands::RemoteClientFactory)
/// function for production use.
pub fn create_http_client(
    settings: &ConnectionSettings,
) -> Result<Arc<dyn RemoteControlClient>, ApiError> {
    Ok(Arc::new(HttpRemoteControlClient::new(settings)?))
}

#[async_trait]
impl RemoteControlClient for HttpRemoteControlClient {
    async fn health(&self) -> Result<HealthResponse, ApiError> {
        self.call(|| self.http.get(self.url(HEALTH_PATH))).await
    }

    async fn list_displays(&self) -> Result<Vec<DisplayStatus>, ApiError> {
        let response: DisplaysResponse = self.call(|| self.http.get(self.url(DISPLAYS_PATH))).await?;
        Ok(response.displays)
    }

    async fn set_brightness(&self, id: DisplayId, value: u8) -> Result<DisplayStatus, ApiError> {
        let body = ValueRequest { value };
        let response: SingleDisplayResponse = self
            .call(|| self.http.post(self.url(&display_brightness_path(id))).json(&body))
            .await?;
        Ok(response.display)
    }

    async fn set_all_brightness(&self, value: u8) -> Result<Vec<DisplayStatus>, ApiError> {
        let body = ValueRequest { value };
        let response: DisplaysResponse = self
            .call(|| self.http.post(self.url(ALL_BRIGHTNESS_PATH)).json(&body))
            .await?;
        Ok(response.displays)
    }

    async fn set_volume(&self, id: DisplayId, value: u8) -> Result<DisplayStatus, ApiError> {
        let body = ValueRequest { value };
        let response: SingleDisplayResponse = self
            .call(|| self.http.post(self.url(&display_volume_path(id))).json(&body))
            .await?;
        Ok(response.display)
    }

    async fn set_all_volume(&self, value: u8) -> Result<Vec<DisplayStatus>, ApiError> {
        let body = ValueRequest { value };
        let response: DisplaysResponse = self
            .call(|| self.http.post(self.url(ALL_VOLUME_PATH)).json(&body))
            .await?;
        Ok(response.displays)
    }

    async fn set_power(
        &self,
        id: DisplayId,
        state: PowerState,
    ) -> Result<SinglePowerResponse, ApiError> {
        let body = PowerRequest { state };
        self.call(|| self.http.post(self.url(&display_power_path(id))).json(&body))
            .await
    }

    async fn set_all_power(&self, state: PowerState) -> Result<AllPowerResponse, ApiError> {
        let body = PowerRequest { state };
        self.call(|| self.http.post(self.url(ALL_POWER_PATH)).json(&body))
            .await
    }

    async fn set_input(&self, id: DisplayId, code: u8) -> Result<DisplayStatus, ApiError> {
        let body = InputRequest { code };
        let response: SingleDisplayResponse = self
            .call(|| self.http.post(self.url(&display_input_path(id))).json(&body))
            .await?;
        Ok(response.display)
    }
}

// ── Error mapping ─────────────────────────────────────────────────────────────

fn map_reqwest_error(error: reqwest::Error) -> ApiError {
    ApiError::transport(transport_kind(&error), error.to_string())
}

/// Classifies a reqwest failure by walking its source chain.
pub(crate) fn transport_kind(error: &reqwest::Error) -> TransportKind {
    if error.is_timeout() {
        return TransportKind::Timeout;
    }

    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(cause) = source {
        if let Some(kind) = cause
            .downcast_ref::<io::Error>()
            .and_then(|io| kind_for_io(io.kind()))
        {
            return kind;
        }
        if let Some(kind) = kind_for_message(&cause.to_string()) {
            return kind;
        }
        source = cause.source();
    }
    kind_for_message(&error.to_string()).unwrap_or(TransportKind::Other)
}

fn kind_for_io(kind: io::ErrorKind) -> Option<TransportKind> {
    match kind {
        io::ErrorKind::ConnectionRefused => Some(TransportKind::ConnectionRefused),
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => Some(TransportKind::ConnectionReset),
        io::ErrorKind::UnexpectedEof => Some(TransportKind::UnexpectedEof),
        io::ErrorKind::TimedOut => Some(TransportKind::Timeout),
        _ => None,
    }
}

/// hyper reports truncated responses as plain messages, not io errors.
fn kind_for_message(message: &str) -> Option<TransportKind> {
    let message = message.to_ascii_lowercase();
    if message.contains("connection closed before message completed")
        || message.contains("unexpected end of")
    {
        Some(TransportKind::UnexpectedEof)
    } else if message.contains("connection reset") || message.contains("broken pipe") {
        Some(TransportKind::ConnectionReset)
    } else if message.contains("connection refused") {
        Some(TransportKind::ConnectionRefused)
    } else {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
