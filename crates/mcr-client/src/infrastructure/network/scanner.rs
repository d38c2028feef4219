//! LAN probing adapters for the host scan.
//!
//! - [`HttpHostProber`] sends one `GET api/v1/health` per host with tight
//!   timeouts and classifies the answer.
//! - [`SystemInterfaces`] reads the machine's IPv4 interfaces through
//!   `if_addrs` and expands their private /24 subnets into candidates.
//!
//! [`lan_scanner`] wires both into a
//! [`ConcurrentHostScanner`](crate::application::scan_hosts::ConcurrentHostScanner).

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use if_addrs::IfAddr;
use mcr_core::domain::scan::{classify_probe_response, enumerate_candidates};
use mcr_core::domain::settings::DEFAULT_PORT;
use mcr_core::protocol::messages::HEALTH_PATH;
use mcr_core::ScannedHostCandidate;
use reqwest::header::ACCEPT;
use tracing::{trace, warn};

use crate::application::scan_hosts::{
    CandidateSource, ConcurrentHostScanner, HostProber, ScanError,
};

pub const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_millis(250);
pub const PROBE_READ_TIMEOUT: Duration = Duration::from_millis(250);
pub const PROBE_CALL_TIMEOUT: Duration = Duration::from_millis(500);

/// Probes hosts over plain HTTP for the service's health signature.
#[derive(Debug, Clone)]
pub struct HttpHostProber {
    http: reqwest::Client,
    port: u16,
}

impl HttpHostProber {
    /// Prober for the default service port.
    pub fn new() -> Result<Self, ScanError> {
        Self::with_port(DEFAULT_PORT)
    }

    pub fn with_port(port: u16) -> Result<Self, ScanError> {
        let http = reqwest::Client::builder()
            .connect_timeout(PROBE_CONNECT_TIMEOUT)
            .read_timeout(PROBE_READ_TIMEOUT)
            .timeout(PROBE_CALL_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| ScanError::Setup(e.to_string()))?;
        Ok(Self { http, port })
    }
}

#[async_trait]
impl HostProber for HttpHostProber {
    async fn probe(&self, host: &str, token: &str) -> Option<ScannedHostCandidate> {
        let url = format!("http://{host}:{}/{HEALTH_PATH}", self.port);
        let token = token.trim();
        let mut request = self.http.get(url).header(ACCEPT, "application/json");
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                trace!(host, "probe failed: {e}");
                return None;
            }
        };
        let status = response.status().as_u16();
        let body = response.text().await.ok()?;
        let latency_ms = (started.elapsed().as_secs_f64() * 1000.0).round() as u64;

        let match_kind = classify_probe_response(status, &body)?;
        Some(ScannedHostCandidate {
            host: host.to_string(),
            latency_ms,
            match_kind,
        })
    }
}

/// Candidate source backed by the machine's network interfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl CandidateSource for SystemInterfaces {
    fn candidates(&self, preferred_host: Option<&str>) -> Vec<String> {
        enumerate_candidates(preferred_host, &local_private_ipv4s())
    }
}

/// Private IPv4 addresses of every non-loopback interface that is up.
fn local_private_ipv4s() -> Vec<Ipv4Addr> {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter(|iface| !iface.is_loopback() && interface_is_up(&iface.name))
            .filter_map(|iface| match iface.addr {
                IfAddr::V4(v4) => Some(v4.ip),
                IfAddr::V6(_) => None,
            })
            .filter(Ipv4Addr::is_private)
            .collect(),
        Err(e) => {
            warn!("could not enumerate network interfaces: {e}");
            Vec::new()
        }
    }
}

/// Whether the interface's link is up.
///
/// `if_addrs` reports no interface flags.  On Linux the kernel's `operstate`
/// is read instead; on other platforms every listed interface counts as up.
fn interface_is_up(name: &str) -> bool {
    #[cfg(target_os = "linux")]
    {
        let path = std::path::Path::new("/sys/class/net")
            .join(name)
            .join("operstate");
        std::fs::read_to_string(path).map_or(true, |state| operstate_is_up(&state))
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = name;
        true
    }
}

/// `unknown` and `dormant` still carry traffic on some drivers (tun, wifi).
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn operstate_is_up(state: &str) -> bool {
    !matches!(state.trim(), "down" | "lowerlayerdown" | "notpresent")
}

/// The production scanner: HTTP probes over the local private subnets.
pub fn lan_scanner(max_concurrency: usize) -> Result<ConcurrentHostScanner, ScanError> {
    Ok(ConcurrentHostScanner::with_concurrency(
        Arc::new(HttpHostProber::new()?),
        Arc::new(SystemInterfaces),
        max_concurrency,
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
