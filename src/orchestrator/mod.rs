//! Refresh and persistence event loop
//!
//! A single task owns the current snapshot and the cycles still collecting
//! probe results. Everything that waits on the network (catalog fetches,
//! snapshot writes, probes) runs in spawned tasks that report back over
//! channels, so the loop itself only ever reacts to events.
//!
//! A refresh cycle is complete once its fetch task has reported how many
//! regions it dispatched and that many outcomes came back. The completed
//! cycle is ranked, truncated and becomes the new snapshot.

use crate::catalog::RegionSource;
use crate::error::{AppError, FetchError, PersistError, Result};
use crate::logging::Logger;
use crate::models::{Config, Region};
use crate::persist::SnapshotPersister;
use crate::pool::{PoolSettings, ProbeOutcome, ProbeRequest, WorkerPool};
use crate::probe::LatencyProber;
use crate::ranking::Ranking;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What `run` hands back once it has shut down
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Refresh cycles that replaced the snapshot
    pub cycles_completed: u64,
    pub snapshots_persisted: u64,
    pub last_snapshot: Option<Arc<[Region]>>,
}

/// Reports of spawned tasks
#[derive(Debug)]
enum TaskEvent {
    Fetched { cycle: u64, dispatched: usize },
    FetchFailed { cycle: u64, error: FetchError },
    Persisted { regions: usize, elapsed: Duration },
    PersistFailed { error: PersistError },
    Cancelled,
}

/// Results gathered so far for one refresh cycle
#[derive(Debug)]
struct CycleProgress {
    correlation_id: String,
    started: Instant,
    /// Set once the fetch task is done dispatching
    expected: Option<usize>,
    received: usize,
    regions: Vec<Region>,
}

impl CycleProgress {
    fn new(correlation_id: String) -> Self {
        Self {
            correlation_id,
            started: Instant::now(),
            expected: None,
            received: 0,
            regions: Vec::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.expected == Some(self.received)
    }
}

/// Consecutive failures of one kind, checked against the optional limit
#[derive(Debug, Default)]
struct FailureStreak {
    limit: u32,
    current: u32,
}

impl FailureStreak {
    fn new(limit: u32) -> Self {
        Self { limit, current: 0 }
    }

    /// Record a failure; true once the limit is reached
    fn fail(&mut self) -> bool {
        self.current = self.current.saturating_add(1);
        self.limit > 0 && self.current >= self.limit
    }

    fn reset(&mut self) {
        self.current = 0;
    }
}

/// Drives fetch, probe, rank and persist until shut down
pub struct Orchestrator {
    config: Config,
    ranking: Ranking,
    source: Arc<dyn RegionSource>,
    prober: Arc<dyn LatencyProber>,
    persister: SnapshotPersister,
    logger: Logger,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        source: Arc<dyn RegionSource>,
        prober: Arc<dyn LatencyProber>,
        persister: SnapshotPersister,
        logger: Logger,
    ) -> Result<Self> {
        let ranking = config.ranking()?;

        Ok(Self {
            config,
            ranking,
            source,
            prober,
            persister,
            logger: logger.named("orchestrator"),
            cancel: CancellationToken::new(),
        })
    }

    /// Token cancelling every task of this orchestrator; cancelling it also stops `run`
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the event loop until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            ranking,
            source,
            prober,
            persister,
            logger,
            cancel,
        } = self;

        let settings = PoolSettings::from(&config);
        if config.workers == 0 {
            logger
                .debug("no workers set, using default value")
                .field("workers", settings.workers)
                .log()
                .await;
        }

        let (pool, mut results) =
            WorkerPool::start(settings, prober, logger.named("worker"), cancel.child_token());
        let requests = pool.requests();

        logger
            .info("starting event loop")
            .field("source", source.describe())
            .field("target", persister.describe())
            .field("workers", pool.worker_count())
            .field("ranking", ranking.to_string())
            .field("max_regions", config.max_regions)
            .log()
            .await;

        let initial = tokio::time::sleep(config.initial_delay);
        tokio::pin!(initial);
        let mut initial_pending = true;

        let mut refresh = interval_at(Instant::now() + config.frequency, config.frequency);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // armed by the first refresh start
        let mut persist_timer: Option<Interval> = None;

        tokio::pin!(shutdown);

        let mut tasks: JoinSet<TaskEvent> = JoinSet::new();
        let mut cycles: BTreeMap<u64, CycleProgress> = BTreeMap::new();
        let mut next_cycle: u64 = 0;
        let mut last_completed: u64 = 0;
        let mut snapshot: Option<Arc<[Region]>> = None;
        let mut persist_in_flight = false;
        let mut fetch_streak = FailureStreak::new(config.max_consecutive_failures);
        let mut persist_streak = FailureStreak::new(config.max_consecutive_failures);
        let mut summary = RunSummary::default();
        let mut fatal: Option<AppError> = None;

        loop {
            let refresh_due = tokio::select! {
                _ = &mut shutdown => {
                    logger.info("received shutdown signal").log().await;
                    break;
                }
                _ = cancel.cancelled() => {
                    logger.info("cancelled").log().await;
                    break;
                }
                _ = &mut initial, if initial_pending => {
                    initial_pending = false;
                    true
                }
                _ = refresh.tick() => true,
                _ = next_tick(&mut persist_timer) => {
                    match &snapshot {
                        None => {
                            logger.debug("no regions collected yet, nothing to write").log().await;
                        }
                        Some(_) if persist_in_flight => {
                            logger.debug("previous write still running, skipping this one").log().await;
                        }
                        Some(regions) => {
                            persist_in_flight = true;
                            tasks.spawn(persist_snapshot(
                                persister.clone(),
                                regions.clone(),
                                config.persist_timeout,
                                cancel.child_token(),
                            ));
                        }
                    }
                    false
                }
                Some(outcome) = results.recv() => {
                    if let Some(completed) = record_outcome(&mut cycles, last_completed, outcome) {
                        if let Some(regions) = complete_cycle(
                            completed, &mut cycles, &mut last_completed, ranking, config.max_regions, &logger,
                        ).await {
                            summary.cycles_completed += 1;
                            snapshot = Some(regions);
                        }
                    }
                    false
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    let event = match joined {
                        Ok(event) => event,
                        Err(e) => {
                            logger.error("background task failed").err(&e).log().await;
                            continue;
                        }
                    };

                    match event {
                        TaskEvent::Fetched { cycle, dispatched } => {
                            fetch_streak.reset();
                            let Some(progress) = cycles.get_mut(&cycle) else { continue };
                            progress.expected = Some(dispatched);

                            logger
                                .info("dispatched regions to workers")
                                .correlation_id(&progress.correlation_id)
                                .field("cycle", cycle)
                                .field("regions", dispatched)
                                .log()
                                .await;

                            if progress.is_complete() {
                                let completed = complete_cycle(
                                    cycle,
                                    &mut cycles,
                                    &mut last_completed,
                                    ranking,
                                    config.max_regions,
                                    &logger,
                                )
                                .await;
                                if let Some(regions) = completed {
                                    summary.cycles_completed += 1;
                                    snapshot = Some(regions);
                                }
                            }
                        }
                        TaskEvent::FetchFailed { cycle, error } => {
                            let correlation_id =
                                cycles.remove(&cycle).map(|p| p.correlation_id).unwrap_or_default();
                            logger
                                .error("could not get list of servers, skipping this refresh")
                                .correlation_id(&correlation_id)
                                .field("cycle", cycle)
                                .err(&error)
                                .log()
                                .await;

                            if fetch_streak.fail() {
                                fatal = Some(AppError::internal(format!(
                                    "catalog fetch failed {} times in a row",
                                    fetch_streak.current
                                )));
                                break;
                            }
                        }
                        TaskEvent::Persisted { regions, elapsed } => {
                            persist_in_flight = false;
                            persist_streak.reset();
                            summary.snapshots_persisted += 1;
                            logger
                                .info("regions written")
                                .field("regions", regions)
                                .duration("elapsed_ms", elapsed)
                                .log()
                                .await;
                        }
                        TaskEvent::PersistFailed { error } => {
                            persist_in_flight = false;
                            logger.error("error while writing regions").err(&error).log().await;

                            if persist_streak.fail() {
                                fatal = Some(AppError::internal(format!(
                                    "snapshot write failed {} times in a row",
                                    persist_streak.current
                                )));
                                break;
                            }
                        }
                        TaskEvent::Cancelled => {}
                    }
                    false
                }
            };

            if refresh_due {
                next_cycle += 1;
                let correlation_id = logger.start_operation("refresh").await;
                logger
                    .info("refreshing regions...")
                    .correlation_id(&correlation_id)
                    .field("cycle", next_cycle)
                    .log()
                    .await;

                cycles.insert(next_cycle, CycleProgress::new(correlation_id));
                tasks.spawn(fetch_and_dispatch(
                    next_cycle,
                    source.clone(),
                    requests.clone(),
                    config.fetch_timeout,
                    cancel.child_token(),
                ));

                persist_timer = Some(interval_at(
                    Instant::now() + config.persist_frequency,
                    config.persist_frequency,
                ));
            }
        }

        logger.info("shutting down...").log().await;

        cancel.cancel();
        results.close();
        drop(requests);
        pool.shutdown().await;

        while let Some(joined) = tasks.join_next().await {
            if let Ok(TaskEvent::Persisted { .. }) = joined {
                summary.snapshots_persisted += 1;
            }
        }

        if !cycles.is_empty() {
            logger
                .debug("discarding unfinished refresh cycles")
                .field("cycles", cycles.len())
                .log()
                .await;
        }

        summary.last_snapshot = snapshot;

        match fatal {
            Some(error) => {
                logger.fatal("giving up").error_info(&error).log().await;
                Err(error)
            }
            None => Ok(summary),
        }
    }
}

/// Resolves on the next tick, or never while the timer is unarmed
async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Count an outcome against its cycle; returns the cycle if this completed it
fn record_outcome(
    cycles: &mut BTreeMap<u64, CycleProgress>,
    last_completed: u64,
    outcome: ProbeOutcome,
) -> Option<u64> {
    // late result of a discarded or failed cycle
    if outcome.cycle <= last_completed {
        return None;
    }
    let progress = cycles.get_mut(&outcome.cycle)?;

    progress.received += 1;
    if let Some(region) = outcome.region.filter(|r| r.has_probed_servers()) {
        progress.regions.push(region);
    }

    progress.is_complete().then_some(outcome.cycle)
}

/// Turn a finished cycle into a snapshot and drop the cycles it supersedes
///
/// Returns `None` when the cycle dispatched nothing, in which case the
/// previous snapshot stays.
async fn complete_cycle(
    cycle: u64,
    cycles: &mut BTreeMap<u64, CycleProgress>,
    last_completed: &mut u64,
    ranking: Ranking,
    max_regions: usize,
    logger: &Logger,
) -> Option<Arc<[Region]>> {
    let progress = cycles.remove(&cycle)?;
    *last_completed = (*last_completed).max(cycle);

    let superseded: Vec<u64> = cycles.range(..cycle).map(|(c, _)| *c).collect();
    for old in &superseded {
        cycles.remove(old);
    }
    if !superseded.is_empty() {
        logger
            .warn("newer refresh finished first, dropping older ones")
            .field("dropped", &superseded)
            .log()
            .await;
    }

    if progress.expected == Some(0) {
        logger
            .warn("catalog returned no regions, keeping previous list")
            .correlation_id(&progress.correlation_id)
            .log()
            .await;
        logger.end_operation(&progress.correlation_id, "refresh", false).await;
        return None;
    }

    let reachable = progress.regions.len();
    let ranked = ranking.rank(progress.regions, max_regions);

    logger
        .info("regions updated")
        .correlation_id(&progress.correlation_id)
        .field("cycle", cycle)
        .field("probed", progress.received)
        .field("reachable", reachable)
        .field("kept", ranked.len())
        .duration("elapsed_ms", progress.started.elapsed())
        .log()
        .await;
    logger.end_operation(&progress.correlation_id, "refresh", true).await;

    Some(Arc::from(ranked))
}

/// Fetch the catalog and feed every region to the workers
async fn fetch_and_dispatch(
    cycle: u64,
    source: Arc<dyn RegionSource>,
    requests: mpsc::Sender<ProbeRequest>,
    fetch_timeout: Duration,
    cancel: CancellationToken,
) -> TaskEvent {
    let fetched = tokio::select! {
        biased;
        _ = cancel.cancelled() => return TaskEvent::Cancelled,
        fetched = timeout(fetch_timeout, source.fetch()) => fetched,
    };

    let regions = match fetched {
        Ok(Ok(regions)) => regions,
        Ok(Err(error)) => return TaskEvent::FetchFailed { cycle, error },
        Err(_) => {
            return TaskEvent::FetchFailed {
                cycle,
                error: FetchError::Network(format!("no response within {:?}", fetch_timeout)),
            }
        }
    };

    let mut dispatched = 0;
    for region in regions {
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TaskEvent::Cancelled,
            sent = requests.send(ProbeRequest { cycle, region }) => sent,
        };
        if sent.is_err() {
            return TaskEvent::Cancelled;
        }
        dispatched += 1;
    }

    TaskEvent::Fetched { cycle, dispatched }
}

async fn persist_snapshot(
    persister: SnapshotPersister,
    regions: Arc<[Region]>,
    persist_timeout: Duration,
    cancel: CancellationToken,
) -> TaskEvent {
    let start = Instant::now();

    let written = tokio::select! {
        biased;
        _ = cancel.cancelled() => return TaskEvent::Cancelled,
        written = timeout(persist_timeout, persister.persist(&regions)) => written,
    };

    match written {
        Ok(Ok(())) => TaskEvent::Persisted {
            regions: regions.len(),
            elapsed: start.elapsed(),
        },
        Ok(Err(error)) => TaskEvent::PersistFailed { error },
        Err(_) => TaskEvent::PersistFailed {
            error: PersistError::Other(format!("no response within {:?}", persist_timeout)),
        },
    }
}
