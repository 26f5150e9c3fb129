//! Collection coordinator - bounded fan-out of per-host sessions

use super::AuditReport;
use crate::config::AuditConfig;
use crate::credentials::Credentials;
use crate::discovery::Host;
use crate::inventory::{CollectionStep, HostInventory, InventoryCollector};
use crate::session::{RemoteSessionClient, SessionOptions, SessionTransport};
use crate::AuditError;
use log::{debug, error, info, warn};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

/// Coordinator tuning
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Hosts collected at once; `usize::MAX` for no practical bound
    pub parallelism: usize,
    pub session: SessionOptions,
    /// Extra connect attempts after a transport failure
    pub connect_retries: u32,
    pub retry_delay: Duration,
    /// Stop launching hosts after this long
    pub deadline: Option<Duration>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            parallelism: num_cpus::get().max(1) * 4,
            session: SessionOptions::default(),
            connect_retries: 0,
            retry_delay: Duration::from_secs(1),
            deadline: None,
        }
    }
}

impl CoordinatorOptions {
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            parallelism: config.collect_parallelism,
            session: SessionOptions {
                operation_timeout: config.operation_timeout_duration(),
            },
            connect_retries: config.connect_retries,
            deadline: config.deadline_duration(),
            ..Default::default()
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }
}

/// Runs connect, collect and close for every reachable host, merging
/// each finished host into one [`AuditReport`]
pub struct CollectionCoordinator<T: SessionTransport> {
    transport: Arc<T>,
    credentials: Arc<Credentials>,
    collector: Arc<InventoryCollector>,
    options: CoordinatorOptions,
}

impl<T: SessionTransport> CollectionCoordinator<T> {
    pub fn new(
        transport: Arc<T>,
        credentials: Arc<Credentials>,
        collector: InventoryCollector,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            transport,
            credentials,
            collector: Arc::new(collector),
            options,
        }
    }

    pub async fn run(&self, hosts: &[Host]) -> AuditReport {
        self.run_until(hosts, CancellationToken::new()).await
    }

    /// Collect from `hosts` until done or `cancel` fires.
    ///
    /// After cancellation (or the configured deadline) no new host is
    /// started; hosts already running finish and close, and the rest are
    /// reported as skipped.
    pub async fn run_until(&self, hosts: &[Host], cancel: CancellationToken) -> AuditReport {
        let start_time = Instant::now();
        let targets: Vec<Ipv4Addr> = hosts
            .iter()
            .filter(|host| host.is_reachable())
            .map(|host| host.address)
            .collect();

        let limit = self.options.parallelism.clamp(1, Semaphore::MAX_PERMITS);
        info!(
            "Collecting inventory from {} hosts via {} (parallelism {})",
            targets.len(),
            self.transport.protocol_name(),
            limit
        );

        let run_token = cancel.child_token();
        let deadline_timer = self.options.deadline.map(|deadline| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!("Run deadline of {:?} reached, no further hosts will start", deadline);
                token.cancel();
            })
        });

        let semaphore = Arc::new(Semaphore::new(limit));
        let report = Arc::new(Mutex::new(AuditReport::new()));
        let mut handles = Vec::with_capacity(targets.len());

        for (index, &host) in targets.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = run_token.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                let remaining = &targets[index..];
                info!("Run cancelled, skipping {} hosts", remaining.len());
                let mut report = report.lock().await;
                for &skipped in remaining {
                    report.mark_skipped(skipped);
                }
                break;
            };

            let transport = Arc::clone(&self.transport);
            let credentials = Arc::clone(&self.credentials);
            let collector = Arc::clone(&self.collector);
            let options = self.options.clone();
            let report = Arc::clone(&report);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let inventory = collect_host(transport, credentials, collector, options, host).await;
                report.lock().await.merge(inventory);
            });
            handles.push((host, handle));
        }

        for (host, handle) in handles {
            if let Err(e) = handle.await {
                error!("Collection task for {} failed: {}", host, e);
                let cause = AuditError::ExecutionError(format!("collection task aborted: {}", e));
                report
                    .lock()
                    .await
                    .merge(HostInventory::failed(host, CollectionStep::Connect, &cause));
            }
        }

        if let Some(timer) = deadline_timer {
            timer.abort();
        }

        let report = std::mem::take(&mut *report.lock().await);
        info!(
            "Collected {} records from {} hosts ({} skipped) in {:?}",
            report.record_count(),
            report.outcomes.len(),
            report.skipped.len(),
            start_time.elapsed()
        );
        report
    }
}

/// One host end to end. The session is closed on every path.
async fn collect_host<T: SessionTransport>(
    transport: Arc<T>,
    credentials: Arc<Credentials>,
    collector: Arc<InventoryCollector>,
    options: CoordinatorOptions,
    host: Ipv4Addr,
) -> HostInventory {
    let mut attempt = 0;

    loop {
        let mut session = RemoteSessionClient::new(Arc::clone(&transport), host, options.session);

        match session.connect(&credentials).await {
            Ok(()) => {
                let inventory = collector.collect(&mut session, &credentials).await;
                session.close().await;
                info!("{}: {}", host, inventory.status());
                return inventory;
            }
            Err(e) => {
                session.close().await;

                if matches!(e, AuditError::TransportError(_)) && attempt < options.connect_retries {
                    attempt += 1;
                    debug!(
                        "{}: connect failed ({}), retry {}/{}",
                        host, e, attempt, options.connect_retries
                    );
                    tokio::time::sleep(options.retry_delay).await;
                    continue;
                }

                warn!("{}: connect failed: {}", host, e);
                return HostInventory::failed(host, CollectionStep::Connect, &e);
            }
        }
    }
}
