//! Traffic replay against a simulated worker pool.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{SimulationConfig, StrategyKind};
use crate::dispatch::{ConnectionId, Dispatch, DispatchEvent, PartitionBoundary, WorkerId};
use crate::lifecycle::Shutdown;
use crate::simulation::report::{ConnectionOutcome, SimulationReport};
use crate::workers::SimulatedPool;

/// Lowest descriptor handed out, after stdin/stdout/stderr.
const FIRST_FD: u64 = 3;

/// Hands out connection ids the way a kernel hands out descriptors:
/// the lowest free one first, so closed ids are reused quickly.
#[derive(Debug)]
struct FdAllocator {
    free: BinaryHeap<Reverse<u64>>,
    next: u64,
}

impl FdAllocator {
    fn new() -> Self {
        Self {
            free: BinaryHeap::new(),
            next: FIRST_FD,
        }
    }

    fn acquire(&mut self) -> ConnectionId {
        if let Some(Reverse(fd)) = self.free.pop() {
            return ConnectionId(fd);
        }
        let fd = self.next;
        self.next += 1;
        ConnectionId(fd)
    }

    fn release(&mut self, connection: ConnectionId) {
        self.free.push(Reverse(connection.as_u64()));
    }
}

/// Requests one connection will send, generated up front.
#[derive(Debug)]
struct ConnectionPlan {
    risky: bool,
    requests: Vec<Vec<u8>>,
    service: Duration,
}

impl ConnectionPlan {
    fn generate<R: Rng>(config: &SimulationConfig, rng: &mut R) -> Self {
        let risky = rng.gen_bool(config.risky_ratio.clamp(0.0, 1.0));
        let (paths, service_ms) = if risky {
            (&config.risky_paths, config.risky_service_ms)
        } else {
            (&config.safe_paths, config.safe_service_ms)
        };
        let host = config.hosts.choose(rng).map(String::as_str);

        let requests = (0..config.requests_per_connection)
            .map(|_| {
                let path = paths.choose(rng).map(String::as_str).unwrap_or("/");
                request_head(path, host)
            })
            .collect();

        Self {
            risky,
            requests,
            service: Duration::from_millis(service_ms),
        }
    }
}

fn request_head(path: &str, host: Option<&str>) -> Vec<u8> {
    let mut head = format!("GET {path} HTTP/1.1\r\n");
    if let Some(host) = host {
        head.push_str(&format!("Host: {host}\r\n"));
    }
    head.push_str("User-Agent: worker-dispatch-sim\r\nAccept: */*\r\n\r\n");
    head.into_bytes()
}

/// Drives a dispatcher with generated connections and checks where requests land.
pub struct Simulation {
    dispatcher: Arc<dyn Dispatch>,
    pool: Arc<SimulatedPool>,
    strategy: StrategyKind,
    layout: PartitionBoundary,
}

impl Simulation {
    /// `layout` is the partition split the report measures against; it should
    /// match the dispatcher's percent even for strategies that ignore it.
    pub fn new(
        dispatcher: Arc<dyn Dispatch>,
        pool: Arc<SimulatedPool>,
        strategy: StrategyKind,
        layout: PartitionBoundary,
    ) -> Self {
        Self {
            dispatcher,
            pool,
            strategy,
            layout,
        }
    }

    /// Run every configured connection, at most `concurrency` at a time.
    ///
    /// A shutdown trigger stops new connections; open ones finish their
    /// current request and close.
    pub async fn run(&self, config: &SimulationConfig, shutdown: Shutdown) -> SimulationReport {
        let started = Instant::now();
        let mut report = SimulationReport::new(self.strategy, self.layout);

        let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let fds = Arc::new(Mutex::new(FdAllocator::new()));
        let mut shutdown_rx = shutdown.subscribe();
        let mut tasks = JoinSet::new();

        tracing::info!(
            connections = config.connections,
            concurrency = config.concurrency,
            workers = self.layout.worker_count(),
            boundary = self.layout.boundary(),
            strategy = ?self.strategy,
            "Simulation started"
        );

        for _ in 0..config.connections {
            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown_rx.recv() => {
                    report.interrupted = true;
                    break;
                }
            };
            if shutdown.is_triggered() {
                report.interrupted = true;
                break;
            }

            let connection = fds
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .acquire();
            let plan = ConnectionPlan::generate(config, &mut rand::thread_rng());

            let dispatcher = self.dispatcher.clone();
            let pool = self.pool.clone();
            let fds = fds.clone();
            let shutdown = shutdown.clone();
            let announce = config.announce_connections;

            tasks.spawn(async move {
                let outcome =
                    drive_connection(dispatcher, pool, connection, plan, announce, shutdown).await;
                fds.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .release(connection);
                drop(permit);
                outcome
            });
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(outcome) => report.absorb(outcome, self.layout),
                Err(e) => {
                    tracing::error!(error = %e, "Simulated connection task failed");
                    report.record_error("task_failed");
                }
            }
        }

        report.requests_per_worker = self.pool.handled_counts();
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            connections = report.connections,
            requests = report.requests,
            risky_in_safe_partition = report.risky_in_safe_partition,
            affinity_violations = report.affinity_violations,
            errors = report.error_count(),
            elapsed_ms = report.elapsed_ms,
            "Simulation finished"
        );

        report
    }
}

/// Tracks the worker a connection was first routed to.
#[derive(Debug, Default)]
struct AffinityCheck {
    pinned: Option<WorkerId>,
}

impl AffinityCheck {
    /// Returns `true` when `worker` differs from the first worker seen.
    fn observe(&mut self, worker: WorkerId) -> bool {
        match self.pinned {
            Some(pinned) => pinned != worker,
            None => {
                self.pinned = Some(worker);
                false
            }
        }
    }
}

async fn drive_connection(
    dispatcher: Arc<dyn Dispatch>,
    pool: Arc<SimulatedPool>,
    connection: ConnectionId,
    plan: ConnectionPlan,
    announce: bool,
    shutdown: Shutdown,
) -> ConnectionOutcome {
    let mut outcome = ConnectionOutcome {
        risky: plan.risky,
        ..ConnectionOutcome::default()
    };
    let mut affinity = AffinityCheck::default();

    if announce {
        match dispatcher.dispatch_event(pool.as_ref(), DispatchEvent::start(connection)) {
            Ok(worker) => {
                affinity.observe(worker);
            }
            Err(e) => outcome.errors.push(e.kind()),
        }
    }

    for request in &plan.requests {
        if shutdown.is_triggered() {
            break;
        }

        let event = DispatchEvent::fetch(connection, request);
        let worker = match dispatcher.dispatch_event(pool.as_ref(), event) {
            Ok(worker) => worker,
            Err(e) => {
                outcome.errors.push(e.kind());
                continue;
            }
        };
        if affinity.observe(worker) {
            outcome.affinity_violations += 1;
        }

        let Some(_guard) = pool.begin(worker) else {
            outcome.errors.push("worker_out_of_range");
            continue;
        };
        outcome.placements.push(worker);
        tokio::time::sleep(plan.service).await;
    }

    match dispatcher.dispatch_event(pool.as_ref(), DispatchEvent::close(connection)) {
        Ok(worker) => {
            if affinity.observe(worker) {
                outcome.affinity_violations += 1;
            }
        }
        Err(e) => outcome.errors.push(e.kind()),
    }

    tracing::trace!(
        connection = %connection,
        risky = plan.risky,
        worker = ?affinity.pinned,
        "Simulated connection closed"
    );
    outcome
}
