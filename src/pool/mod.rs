//! Bounded pool of probing workers
//!
//! Workers share one bounded request queue and one bounded result queue.
//! A worker takes one region at a time, probes its WireGuard servers one
//! after the other and sends back a copy of the region that only lists the
//! servers that answered within the latency budget. Regions with nothing
//! reachable produce an explicit empty outcome so the caller can count
//! every dispatched region.

use crate::logging::Logger;
use crate::models::{Config, Region, Server};
use crate::probe::{endpoint_address, LatencyProber};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One region to probe, tagged with the refresh cycle that dispatched it
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub cycle: u64,
    pub region: Region,
}

/// Result of probing one region
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub cycle: u64,
    pub region_id: String,
    /// `None` when the region had no reachable server of the probed family
    pub region: Option<Region>,
}

/// Pool settings derived from the configuration
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub workers: usize,
    pub max_latency: Duration,
    pub probe_port: u16,
    pub queue_capacity: usize,
}

impl From<&Config> for PoolSettings {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.effective_workers(),
            max_latency: config.max_latency,
            probe_port: config.probe_port,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Handle on the running workers
pub struct WorkerPool {
    requests: mpsc::Sender<ProbeRequest>,
    handles: Vec<JoinHandle<()>>,
    logger: Logger,
}

impl WorkerPool {
    /// Spawn the workers; returns the pool and the receiving end of the result queue
    pub fn start(
        settings: PoolSettings,
        prober: Arc<dyn LatencyProber>,
        logger: Logger,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<ProbeOutcome>) {
        let (request_tx, request_rx) = mpsc::channel::<ProbeRequest>(settings.queue_capacity);
        let (result_tx, result_rx) = mpsc::channel::<ProbeOutcome>(settings.queue_capacity);
        let request_rx = Arc::new(Mutex::new(request_rx));
        let settings = Arc::new(settings);

        let handles = (1..=settings.workers.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    requests: request_rx.clone(),
                    results: result_tx.clone(),
                    prober: prober.clone(),
                    settings: settings.clone(),
                    logger: logger.with_field("worker", id),
                    cancel: cancel.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let pool = Self {
            requests: request_tx,
            handles,
            logger,
        };

        (pool, result_rx)
    }

    /// Producer handle for the request queue
    pub fn requests(&self) -> mpsc::Sender<ProbeRequest> {
        self.requests.clone()
    }

    /// Number of running workers
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Close the request queue and wait for every worker to exit
    pub async fn shutdown(self) {
        let Self { requests, handles, logger } = self;
        drop(requests);

        for result in join_all(handles).await {
            if let Err(e) = result {
                logger.error("worker task failed").err(&e).log().await;
            }
        }
    }
}

struct Worker {
    id: usize,
    requests: Arc<Mutex<mpsc::Receiver<ProbeRequest>>>,
    results: mpsc::Sender<ProbeOutcome>,
    prober: Arc<dyn LatencyProber>,
    settings: Arc<PoolSettings>,
    logger: Logger,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        self.logger.info("worker starting...").log().await;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = async { self.requests.lock().await.recv().await } => next,
            };

            // queue closed and drained
            let Some(request) = next else { break };

            let probed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                probed = probe_region(&request.region, self.prober.as_ref(), &self.settings, &self.logger) => probed,
            };

            let outcome = ProbeOutcome {
                cycle: request.cycle,
                region_id: request.region.id,
                region: probed,
            };

            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                sent = self.results.send(outcome) => sent,
            };

            if sent.is_err() {
                // result queue closed: nobody is collecting anymore
                break;
            }
        }

        self.logger.info("worker exited").field("id", self.id).log().await;
    }
}

/// Probe every server of the region's probed family, sequentially
///
/// Returns a copy of the region listing only the servers that connected
/// within the budget, with their latency set, or `None` when none did.
pub async fn probe_region(
    region: &Region,
    prober: &dyn LatencyProber,
    settings: &PoolSettings,
    logger: &Logger,
) -> Option<Region> {
    if !region.has_probed_servers() {
        logger
            .debug("region has no WireGuard servers, skipping...")
            .field("region", &region.id)
            .log()
            .await;
        return None;
    }

    let mut reachable: Vec<Server> = Vec::with_capacity(region.probed_servers().len());

    for server in region.probed_servers() {
        let address = endpoint_address(&server.ip, settings.probe_port);

        match prober.probe(&address, settings.max_latency).await {
            Ok(latency) => {
                logger
                    .debug("connected and retrieved latency")
                    .field("cn", &server.cn)
                    .field("ip", &server.ip)
                    .duration("latency_ms", latency)
                    .log()
                    .await;
                reachable.push(server.with_latency(latency));
            }
            Err(e) if e.is_timeout() => {
                logger
                    .debug("ignoring, as latency is too high")
                    .field("cn", &server.cn)
                    .field("ip", &server.ip)
                    .log()
                    .await;
            }
            Err(e) => {
                logger
                    .error("error while connecting to server, skipping...")
                    .field("cn", &server.cn)
                    .field("ip", &server.ip)
                    .err(&e)
                    .log()
                    .await;
            }
        }
    }

    if reachable.is_empty() {
        None
    } else {
        Some(region.with_probed_servers(reachable))
    }
}
