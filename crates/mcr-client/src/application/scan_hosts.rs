//! ScanHostsUseCase: finds the display-control service on the LAN.
//!
//! [`ConcurrentHostScanner`] asks a [`CandidateSource`] for the addresses to
//! try, probes each distinct address at most once through a [`HostProber`],
//! and returns the matches ranked by
//! [`rank_candidates`](mcr_core::domain::scan::rank_candidates).
//!
//! # Bounded concurrency (for beginners)
//!
//! A /24 sweep is 254 HTTP requests.  Firing them all at once would exhaust
//! sockets on small devices, so every probe first takes a permit from a
//! `tokio::sync::Semaphore` (64 by default).  The probes run on a
//! `tokio::task::JoinSet`; dropping the set aborts every probe still running,
//! which is how cancelling a scan stops the network traffic promptly.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use mcr_core::domain::scan::{rank_candidates, DEFAULT_SCAN_CONCURRENCY};
use mcr_core::ScannedHostCandidate;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Error type for a scan as a whole.  Individual probe failures never
/// surface here; they simply produce no match.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan worker failed: {0}")]
    Worker(String),
    #[error("could not build the scanner: {0}")]
    Setup(String),
}

/// Scans the LAN for the service.
#[async_trait]
pub trait HostScanner: Send + Sync {
    /// Returns ranked matches.  `preferred_host` is tried first when it is a
    /// valid IPv4 address.
    async fn scan(
        &self,
        token: &str,
        preferred_host: Option<&str>,
    ) -> Result<Vec<ScannedHostCandidate>, ScanError>;
}

/// Probes a single host for the service signature.
///
/// Returns `None` for anything that is not a match, including timeouts and
/// I/O errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostProber: Send + Sync {
    async fn probe(&self, host: &str, token: &str) -> Option<ScannedHostCandidate>;
}

/// Supplies the ordered list of hosts to probe.
pub trait CandidateSource: Send + Sync {
    fn candidates(&self, preferred_host: Option<&str>) -> Vec<String>;
}

/// [`HostScanner`] that probes candidates concurrently under a permit limit.
pub struct ConcurrentHostScanner {
    prober: Arc<dyn HostProber>,
    source: Arc<dyn CandidateSource>,
    max_concurrency: usize,
}

impl ConcurrentHostScanner {
    pub fn new(prober: Arc<dyn HostProber>, source: Arc<dyn CandidateSource>) -> Self {
        Self::with_concurrency(prober, source, DEFAULT_SCAN_CONCURRENCY)
    }

    pub fn with_concurrency(
        prober: Arc<dyn HostProber>,
        source: Arc<dyn CandidateSource>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            prober,
            source,
            max_concurrency: max_concurrency.max(1),
        }
    }
}

/// Trims, drops blanks, and removes duplicates while keeping first occurrences.
fn distinct_hosts(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty() && seen.insert(h.clone()))
        .collect()
}

#[async_trait]
impl HostScanner for ConcurrentHostScanner {
    async fn scan(
        &self,
        token: &str,
        preferred_host: Option<&str>,
    ) -> Result<Vec<ScannedHostCandidate>, ScanError> {
        let hosts = distinct_hosts(self.source.candidates(preferred_host));
        if hosts.is_empty() {
            return Ok(Vec::new());
        }
        info!(
            candidates = hosts.len(),
            concurrency = self.max_concurrency,
            "starting host scan"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let token: Arc<str> = Arc::from(token);
        let mut join_set = JoinSet::new();
        for host in hosts {
            let semaphore = Arc::clone(&semaphore);
            let prober = Arc::clone(&self.prober);
            let token = Arc::clone(&token);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                prober.probe(&host, &token).await
            });
        }

        let mut matches = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Some(candidate)) => {
                    debug!(host = %candidate.host, latency_ms = candidate.latency_ms, "host matched");
                    matches.push(candidate);
                }
                Ok(None) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => return Err(ScanError::Worker(e.to_string())),
            }
        }

        info!(matches = matches.len(), "host scan finished");
        Ok(rank_candidates(matches))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mcr_core::ScanMatchKind;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedSource(Vec<&'static str>);

    impl CandidateSource for FixedSource {
        fn candidates(&self, _preferred_host: Option<&str>) -> Vec<String> {
            self.0.iter().map(|h| h.to_string()).collect()
        }
    }

    fn hit(host: &str, latency_ms: u64, match_kind: ScanMatchKind) -> ScannedHostCandidate {
        ScannedHostCandidate {
            host: host.to_string(),
            latency_ms,
            match_kind,
        }
    }

    #[tokio::test]
    async fn test_each_distinct_host_is_probed_once() {
        // Arrange
        let mut prober = MockHostProber::new();
        for host in ["10.0.0.1", "10.0.0.2"] {
            prober
                .expect_probe()
                .with(eq(host), eq("tok"))
                .times(1)
                .returning(|_, _| None);
        }
        let source = FixedSource(vec![" 10.0.0.1", "10.0.0.2", "", "10.0.0.1 ", "   "]);
        let scanner = ConcurrentHostScanner::new(Arc::new(prober), Arc::new(source));

        // Act
        let result = scanner.scan("tok", None).await.expect("scan");

        // Assert (mock expectations verify the call counts on drop)
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_matches_are_ranked() {
        // Arrange
        let mut prober = MockHostProber::new();
        prober.expect_probe().returning(|host, _| match host {
            "10.0.0.1" => Some(hit("10.0.0.1", 3, ScanMatchKind::UnauthorizedSignature)),
            "10.0.0.2" => Some(hit("10.0.0.2", 30, ScanMatchKind::HealthOk)),
            "10.0.0.3" => Some(hit("10.0.0.3", 8, ScanMatchKind::HealthOk)),
            _ => None,
        });
        let source = FixedSource(vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]);
        let scanner = ConcurrentHostScanner::new(Arc::new(prober), Arc::new(source));

        // Act
        let result = scanner.scan("", None).await.expect("scan");

        // Assert
        let hosts: Vec<&str> = result.iter().map(|c| c.host.as_str()).collect();
        assert_eq!(hosts, vec!["10.0.0.3", "10.0.0.2", "10.0.0.1"]);
    }

    struct CountingProber {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl HostProber for CountingProber {
        async fn probe(&self, _host: &str, _token: &str) -> Option<ScannedHostCandidate> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            None
        }
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_permit_count() {
        // Arrange
        let prober = Arc::new(CountingProber {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let hosts: Vec<&'static str> = vec![
            "10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5", "10.0.0.6", "10.0.0.7",
            "10.0.0.8",
        ];
        let scanner = ConcurrentHostScanner::with_concurrency(
            Arc::clone(&prober) as Arc<dyn HostProber>,
            Arc::new(FixedSource(hosts)),
            3,
        );

        // Act
        scanner.scan("t", None).await.expect("scan");

        // Assert
        let peak = prober.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak concurrency was {peak}");
    }

    #[tokio::test]
    async fn test_empty_candidate_list_returns_no_matches() {
        let prober = MockHostProber::new();
        let scanner = ConcurrentHostScanner::new(Arc::new(prober), Arc::new(FixedSource(vec![])));

        let result = scanner.scan("t", Some("not-an-ip")).await;

        tokio_test::assert_ok!(&result);
        assert!(result.map(|r| r.is_empty()).unwrap_or(false));
    }
}
