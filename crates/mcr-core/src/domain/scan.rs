//! Pure LAN-scan logic: candidate enumeration, probe classification, ranking.
//!
//! The actual network probing lives in the client crate; everything here is
//! deterministic so it can be unit-tested and benchmarked without sockets.
//!
//! # Candidate order (for beginners)
//!
//! ```text
//!  1. preferred host        (only if it is a dotted-quad IPv4 address)
//!  2. 10.0.2.2              (Android emulator's alias for the host machine)
//!  3. x.y.z.1 ..= x.y.z.254 for every private /24 the machine sits on,
//!     prefixes sorted, the machine's own addresses skipped
//! ```
//!
//! Duplicates are removed while keeping the first occurrence, so the preferred
//! host is always probed first even if it also appears in a subnet sweep.

use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::settings::strip_scheme;
use crate::protocol::messages::{ApiErrorEnvelope, HealthResponse};

/// Address an Android emulator uses to reach the machine it runs on.
pub const EMULATOR_HOST: &str = "10.0.2.2";

/// Default number of probes allowed in flight at once.
pub const DEFAULT_SCAN_CONCURRENCY: usize = 64;

/// How a probed host matched the service signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanMatchKind {
    /// `GET api/v1/health` answered `{"status":"ok","version":"v1"}`.
    HealthOk,
    /// The host rejected our token with the service's `unauthorized` envelope.
    UnauthorizedSignature,
}

impl ScanMatchKind {
    /// Sort priority; lower ranks first.
    pub fn priority(self) -> u8 {
        match self {
            ScanMatchKind::HealthOk => 0,
            ScanMatchKind::UnauthorizedSignature => 1,
        }
    }
}

/// A host that answered like the display-control service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedHostCandidate {
    pub host: String,
    pub latency_ms: u64,
    pub match_kind: ScanMatchKind,
}

// ── Enumeration ───────────────────────────────────────────────────────────────

/// Reduces a user-entered host to a dotted-quad IPv4 string.
///
/// Strips whitespace, an `http://` / `https://` scheme, any path and any port
/// suffix.  Returns `None` unless what remains is four decimal octets.
pub fn normalize_preferred_host(raw: &str) -> Option<String> {
    let host_port = strip_scheme(raw.trim()).split('/').next().unwrap_or_default();
    let host = host_port.split(':').next().unwrap_or_default().trim();

    let octets: Vec<&str> = host.split('.').collect();
    let valid = octets.len() == 4
        && octets.iter().all(|part| {
            !part.is_empty()
                && part.len() <= 3
                && part.bytes().all(|b| b.is_ascii_digit())
                && part.parse::<u16>().is_ok_and(|v| v <= 255)
        });
    valid.then(|| host.to_string())
}

/// Builds the ordered, duplicate-free list of hosts to probe.
///
/// `local_addrs` are the machine's own IPv4 addresses on up, non-loopback,
/// private interfaces; the caller is responsible for that filtering.
pub fn enumerate_candidates(preferred: Option<&str>, local_addrs: &[Ipv4Addr]) -> Vec<String> {
    let mut ordered = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |host: String| {
        if seen.insert(host.clone()) {
            ordered.push(host);
        }
    };

    if let Some(host) = preferred.and_then(normalize_preferred_host) {
        push(host);
    }
    push(EMULATOR_HOST.to_string());

    let prefixes: BTreeSet<[u8; 3]> = local_addrs
        .iter()
        .filter(|addr| addr.is_private())
        .map(|addr| {
            let [a, b, c, _] = addr.octets();
            [a, b, c]
        })
        .collect();
    let own: HashSet<Ipv4Addr> = local_addrs.iter().copied().collect();

    for [a, b, c] in prefixes {
        for d in 1..=254u8 {
            let addr = Ipv4Addr::new(a, b, c, d);
            if !own.contains(&addr) {
                push(addr.to_string());
            }
        }
    }
    ordered
}

// ── Classification & ranking ──────────────────────────────────────────────────

/// Decides whether a probe response carries the service signature.
pub fn classify_probe_response(http_status: u16, body: &str) -> Option<ScanMatchKind> {
    match http_status {
        200 => {
            let health: HealthResponse = serde_json::from_str(body).ok()?;
            let matches = health.status.trim().eq_ignore_ascii_case("ok")
                && health.version.trim().eq_ignore_ascii_case("v1");
            matches.then_some(ScanMatchKind::HealthOk)
        }
        401 => {
            let envelope: ApiErrorEnvelope = serde_json::from_str(body).ok()?;
            envelope
                .error
                .code
                .trim()
                .eq_ignore_ascii_case("unauthorized")
                .then_some(ScanMatchKind::UnauthorizedSignature)
        }
        _ => None,
    }
}

/// Sorts matches by (kind priority, latency, host).
pub fn rank_candidates(mut candidates: Vec<ScannedHostCandidate>) -> Vec<ScannedHostCandidate> {
    candidates.sort_by(|a, b| {
        a.match_kind
            .priority()
            .cmp(&b.match_kind.priority())
            .then(a.latency_ms.cmp(&b.latency_ms))
            .then_with(|| a.host.cmp(&b.host))
    });
    candidates
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(host: &str, latency_ms: u64, match_kind: ScanMatchKind) -> ScannedHostCandidate {
        ScannedHostCandidate {
            host: host.to_string(),
            latency_ms,
            match_kind,
        }
    }

    #[test]
    fn test_normalize_preferred_host_strips_scheme_path_and_port() {
        assert_eq!(
            normalize_preferred_host(" HTTP://192.168.1.20:51423/api ").as_deref(),
            Some("192.168.1.20")
        );
        assert_eq!(normalize_preferred_host("10.0.0.1").as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_normalize_preferred_host_rejects_non_ipv4() {
        assert_eq!(normalize_preferred_host("mac.local"), None);
        assert_eq!(normalize_preferred_host("300.1.1.1"), None);
        assert_eq!(normalize_preferred_host("1.2.3"), None);
        assert_eq!(normalize_preferred_host("1.2.3.-4"), None);
        assert_eq!(normalize_preferred_host(""), None);
    }

    #[test]
    fn test_enumerate_orders_preferred_then_emulator_then_subnets() {
        // Arrange
        let locals = [Ipv4Addr::new(192, 168, 1, 5), Ipv4Addr::new(10, 1, 2, 3)];

        // Act
        let hosts = enumerate_candidates(Some("192.168.1.77"), &locals);

        // Assert
        assert_eq!(hosts[0], "192.168.1.77");
        assert_eq!(hosts[1], EMULATOR_HOST);
        // 10.1.2.x sorts before 192.168.1.x.
        assert_eq!(hosts[2], "10.1.2.1");
        assert!(!hosts.contains(&"10.1.2.3".to_string()));
        assert!(!hosts.contains(&"192.168.1.5".to_string()));
        // Preferred host appears once despite being in the sweep.
        assert_eq!(hosts.iter().filter(|h| *h == "192.168.1.77").count(), 1);
        // 2 + (253 + 253) - 1 duplicate
        assert_eq!(hosts.len(), 2 + 253 + 253 - 1);
    }

    #[test]
    fn test_enumerate_ignores_public_addresses_and_merges_same_prefix() {
        let locals = [
            Ipv4Addr::new(8, 8, 8, 8),
            Ipv4Addr::new(172, 16, 0, 10),
            Ipv4Addr::new(172, 16, 0, 11),
        ];

        let hosts = enumerate_candidates(None, &locals);

        assert_eq!(hosts[0], EMULATOR_HOST);
        assert_eq!(hosts.len(), 1 + 252);
        assert!(hosts.iter().all(|h| h == EMULATOR_HOST || h.starts_with("172.16.0.")));
    }

    #[test]
    fn test_classify_health_ok_is_case_insensitive() {
        assert_eq!(
            classify_probe_response(200, r#"{"status":"OK","version":"V1"}"#),
            Some(ScanMatchKind::HealthOk)
        );
        assert_eq!(classify_probe_response(200, r#"{"status":"ok","version":"v2"}"#), None);
        assert_eq!(classify_probe_response(200, "not json"), None);
    }

    #[test]
    fn test_classify_unauthorized_signature() {
        let body = r#"{"error":{"code":"unauthorized","message":"missing token"}}"#;
        assert_eq!(
            classify_probe_response(401, body),
            Some(ScanMatchKind::UnauthorizedSignature)
        );
        assert_eq!(
            classify_probe_response(401, r#"{"error":{"code":"forbidden","message":"x"}}"#),
            None
        );
        assert_eq!(classify_probe_response(403, body), None);
        assert_eq!(classify_probe_response(404, ""), None);
    }

    #[test]
    fn test_rank_sorts_by_kind_then_latency_then_host() {
        // Arrange
        let input = vec![
            candidate("192.168.1.9", 5, ScanMatchKind::UnauthorizedSignature),
            candidate("192.168.1.3", 40, ScanMatchKind::HealthOk),
            candidate("192.168.1.2", 40, ScanMatchKind::HealthOk),
            candidate("192.168.1.4", 12, ScanMatchKind::HealthOk),
        ];

        // Act
        let ranked = rank_candidates(input);

        // Assert
        let hosts: Vec<&str> = ranked.iter().map(|c| c.host.as_str()).collect();
        assert_eq!(
            hosts,
            vec!["192.168.1.4", "192.168.1.2", "192.168.1.3", "192.168.1.9"]
        );
    }
}
