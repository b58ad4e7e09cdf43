/// Simulated connection pool traffic
///
/// Spawns worker tasks that open, use and close tracked connections against the
/// configured backend targets, the way the proxy's pool would. A share of each
/// worker's connections is kept open so a subsequent query has live records to
/// report.
use crate::config::SimulationConfig;
use crate::core::{
    BackendTarget, ConnectionStats, ConnectionTracker, ErrorCategory, TrackedConnection,
};
use crate::error::{FlowError, FlowResult};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Every Nth connection a worker opens stays open after the run
const HOLD_EVERY: usize = 4;

/// Per-worker tallies, summed into the outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationTally {
    pub attempts: u64,
    pub failed: u64,
    pub closed: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub requests: u64,
}

impl SimulationTally {
    fn absorb_closed(&mut self, stats: &ConnectionStats) {
        self.closed += 1;
        self.bytes_sent += stats.bytes_sent;
        self.bytes_received += stats.bytes_received;
        self.requests += stats.requests_issued;
    }

    fn merge(&mut self, other: &SimulationTally) {
        self.attempts += other.attempts;
        self.failed += other.failed;
        self.closed += other.closed;
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;
        self.requests += other.requests;
    }
}

/// Result of a simulation run. Held connections stay registered until this is dropped.
#[derive(Debug)]
pub struct SimulationOutcome {
    pub tally: SimulationTally,
    pub held: Vec<TrackedConnection>,
    pub elapsed: Duration,
}

impl SimulationOutcome {
    /// Close every held connection, folding their traffic into the tally
    pub fn close_all(&mut self) {
        for conn in self.held.drain(..) {
            let stats = conn.close();
            self.tally.absorb_closed(&stats);
        }
    }
}

pub struct Simulation {
    tracker: ConnectionTracker,
    config: SimulationConfig,
}

impl Simulation {
    pub fn new(tracker: ConnectionTracker, config: SimulationConfig) -> Self {
        Self { tracker, config }
    }

    pub async fn run(&self) -> FlowResult<SimulationOutcome> {
        let started = Instant::now();
        let targets: Vec<BackendTarget> =
            self.config.targets.iter().map(BackendTarget::from).collect();
        if targets.is_empty() {
            return Err(FlowError::internal("simulation has no targets"));
        }
        if !(0.0..=1.0).contains(&self.config.error_rate) {
            return Err(FlowError::internal(format!(
                "simulation error_rate must be between 0.0 and 1.0, got {}",
                self.config.error_rate
            )));
        }

        info!(
            "Simulating {} workers x {} connections against {} targets",
            self.config.workers,
            self.config.connections_per_worker,
            targets.len()
        );

        let handles: Vec<_> = (0..self.config.workers)
            .map(|worker| {
                let tracker = self.tracker.clone();
                let targets = targets.clone();
                let config = self.config.clone();
                tokio::spawn(async move { run_worker(worker, tracker, targets, config).await })
            })
            .collect();

        let mut tally = SimulationTally::default();
        let mut held = Vec::new();
        for joined in join_all(handles).await {
            let (worker_tally, worker_held) = joined
                .map_err(|e| FlowError::internal(format!("simulation worker failed: {}", e)))??;
            tally.merge(&worker_tally);
            held.extend(worker_held);
        }

        let elapsed = started.elapsed();
        info!(
            "Simulation finished in {:?}: {} attempts, {} failed, {} held open",
            elapsed,
            tally.attempts,
            tally.failed,
            held.len()
        );

        Ok(SimulationOutcome {
            tally,
            held,
            elapsed,
        })
    }
}

async fn run_worker(
    worker: usize,
    tracker: ConnectionTracker,
    targets: Vec<BackendTarget>,
    config: SimulationConfig,
) -> FlowResult<(SimulationTally, Vec<TrackedConnection>)> {
    let mut rng = StdRng::from_entropy();
    let mut tally = SimulationTally::default();
    let mut held = Vec::new();

    for n in 0..config.connections_per_worker {
        let target = targets[rng.gen_range(0..targets.len())].clone();
        tally.attempts += 1;

        if rng.gen_bool(config.error_rate) {
            let category = if rng.gen_bool(0.5) {
                ErrorCategory::Connect
            } else {
                ErrorCategory::Timeout
            };
            tracker.connect_failed(&target, category);
            tally.failed += 1;
            continue;
        }

        let mut conn = tracker.open(target)?;
        conn.mark_established();

        for _ in 0..config.requests_per_connection {
            conn.begin_request();
            tokio::task::yield_now().await;
            let sent = rng.gen_range(64..4096);
            let received = rng.gen_range(64..65536);
            conn.finish_request(sent, received);
        }

        if n % HOLD_EVERY == 0 {
            held.push(conn);
        } else {
            let stats = conn.close();
            tally.absorb_closed(&stats);
        }
    }

    debug!(
        "Worker {} done: {} attempts, {} held",
        worker,
        tally.attempts,
        held.len()
    );
    Ok((tally, held))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::core::{AggregationPolicy, BackendRole, FlowRegistry};
    use std::sync::Arc;

    fn config(error_rate: f64) -> SimulationConfig {
        SimulationConfig {
            workers: 3,
            connections_per_worker: 8,
            requests_per_connection: 4,
            error_rate,
            targets: vec![
                TargetConfig {
                    host: "shard1:27018".to_string(),
                    role: BackendRole::Shard,
                },
                TargetConfig {
                    host: "shard2:27018".to_string(),
                    role: BackendRole::Shard,
                },
            ],
        }
    }

    fn tracker() -> ConnectionTracker {
        ConnectionTracker::new(Arc::new(FlowRegistry::new(AggregationPolicy::PerTarget)))
    }

    #[tokio::test]
    async fn test_simulation_holds_connections_open() {
        let tracker = tracker();
        let simulation = Simulation::new(tracker.clone(), config(0.0));
        let outcome = simulation.run().await.unwrap();

        // Connections 0 and 4 of each worker are held
        assert_eq!(outcome.held.len(), 6);
        assert_eq!(outcome.tally.attempts, 24);
        assert_eq!(outcome.tally.failed, 0);
        assert_eq!(outcome.tally.closed, 18);

        let stats = tracker.registry().snapshot_aggregated_only().unwrap();
        assert_eq!(stats.total_created, 24);
        assert_eq!(stats.currently_open, 6);
        assert_eq!(stats.total_requests, 96);
        assert_eq!(tracker.registry().live_count(), 6);
    }

    #[tokio::test]
    async fn test_close_all_balances_registry() {
        let tracker = tracker();
        let simulation = Simulation::new(tracker.clone(), config(0.0));
        let mut outcome = simulation.run().await.unwrap();
        outcome.close_all();

        assert!(outcome.held.is_empty());
        assert_eq!(outcome.tally.closed, 24);
        assert_eq!(outcome.tally.requests, 96);

        let stats = tracker.registry().snapshot_aggregated_only().unwrap();
        assert_eq!(stats.currently_open, 0);
        assert_eq!(stats.bytes_sent, outcome.tally.bytes_sent);
        assert_eq!(stats.bytes_received, outcome.tally.bytes_received);
    }

    #[tokio::test]
    async fn test_failed_attempts_counted_as_errors() {
        let tracker = tracker();
        let simulation = Simulation::new(tracker.clone(), config(1.0));
        let outcome = simulation.run().await.unwrap();

        assert_eq!(outcome.tally.failed, 24);
        assert!(outcome.held.is_empty());

        let stats = tracker.registry().snapshot_aggregated_only().unwrap();
        assert_eq!(stats.total_created, 0);
        assert_eq!(stats.errors.connect + stats.errors.timeout, 24);
    }

    #[tokio::test]
    async fn test_dropping_outcome_unregisters_held() {
        let tracker = tracker();
        let outcome = Simulation::new(tracker.clone(), config(0.0)).run().await.unwrap();
        assert_eq!(tracker.registry().live_count(), 6);

        drop(outcome);
        assert_eq!(tracker.registry().live_count(), 0);
        assert_eq!(
            tracker.registry().snapshot_aggregated_only().unwrap().currently_open,
            0
        );
    }

    #[tokio::test]
    async fn test_out_of_range_error_rate_is_rejected() {
        let tracker = tracker();
        for error_rate in [-0.1, 1.5, f64::NAN] {
            let result = Simulation::new(tracker.clone(), config(error_rate)).run().await;
            assert!(matches!(result, Err(FlowError::Internal { .. })));
        }
        assert_eq!(tracker.registry().live_count(), 0);
        assert_eq!(
            tracker.registry().snapshot_aggregated_only().unwrap().errors.total(),
            0
        );
    }
}
