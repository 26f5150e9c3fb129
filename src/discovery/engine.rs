//! Host scanner - drives a liveness probe across an address range

use super::*;
use futures::future;
use futures::stream::{self, StreamExt};
use log::{debug, info};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Probes every address of a range with bounded concurrency
pub struct HostScanner<P> {
    probe: P,
    config: DiscoveryConfig,
}

impl<P: LivenessProbe> HostScanner<P> {
    pub fn new(probe: P, config: DiscoveryConfig) -> Self {
        Self { probe, config }
    }

    /// Each in-flight probe holds one socket, so `parallel_limit` should stay
    /// under the process file descriptor limit. Connects that fail for lack
    /// of descriptors are classified as unreachable like any other error;
    /// see [`AuditConfig::fit_scan_parallelism`](crate::AuditConfig::fit_scan_parallelism).
    pub fn with_parallelism(probe: P, parallel_limit: usize) -> Self {
        Self::new(probe, DiscoveryConfig { parallel_limit })
    }

    /// Return the reachable hosts of `range`, in no particular order
    pub async fn scan(&self, range: &AddressRange) -> Vec<Host> {
        self.scan_until(range, &CancellationToken::new()).await
    }

    /// Like [`scan`](Self::scan), but stops launching probes once `cancel`
    /// fires. Probes already in flight still finish within their timeout.
    pub async fn scan_until(&self, range: &AddressRange, cancel: &CancellationToken) -> Vec<Host> {
        let start_time = Instant::now();
        let limit = self.config.parallel_limit.max(1);
        info!(
            "Probing {} addresses in {} via {} (parallelism {})",
            range.len(),
            range,
            self.probe.method_name(),
            limit
        );

        let reachable: Vec<Host> = stream::iter(range.iter())
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|address| async move {
                Host::new(address).classified(self.probe.probe(address).await)
            })
            .buffer_unordered(limit)
            .filter(|host| future::ready(host.is_reachable()))
            .collect()
            .await;

        if cancel.is_cancelled() {
            debug!("Scan of {} cancelled before completion", range);
        }
        info!(
            "Found {} reachable hosts in {} ({:?})",
            reachable.len(),
            range,
            start_time.elapsed()
        );

        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedProbe {
        up: HashSet<Ipv4Addr>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl FixedProbe {
        fn new(up: &[Ipv4Addr]) -> Self {
            Self {
                up: up.iter().copied().collect(),
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl LivenessProbe for FixedProbe {
        async fn probe(&self, address: Ipv4Addr) -> Reachability {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.up.contains(&address) {
                Reachability::Reachable
            } else {
                Reachability::Unreachable
            }
        }

        fn method_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let probe = FixedProbe::new(&[]);
        let peak = probe.peak.clone();
        let scanner = HostScanner::with_parallelism(probe, 3);

        let range: AddressRange = "10.0.0.0/27".parse().unwrap();
        scanner.scan(&range).await;

        let observed = peak.load(Ordering::SeqCst);
        assert!(observed <= 3, "peak concurrency {} exceeded limit", observed);
        assert!(observed > 1, "default path should overlap probes");
    }

    #[tokio::test]
    async fn test_sequential_scan_is_legal() {
        let target = Ipv4Addr::new(10, 0, 0, 5);
        let probe = FixedProbe::new(&[target]);
        let peak = probe.peak.clone();
        let scanner = HostScanner::with_parallelism(probe, 1);

        let hosts = scanner.scan(&"10.0.0.0/29".parse().unwrap()).await;
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].address, target);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_scan_launches_nothing() {
        let scanner = HostScanner::with_parallelism(FixedProbe::new(&[Ipv4Addr::new(10, 0, 0, 1)]), 4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let hosts = scanner.scan_until(&"10.0.0.0/24".parse().unwrap(), &cancel).await;
        assert!(hosts.is_empty());
    }
}
