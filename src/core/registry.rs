/// Flow registry: live outbound connection accounting
///
/// The registry maps connection ids to their records in a sharded concurrent map,
/// so connections living on different shards never contend with each other.
/// Cumulative counters are plain atomics. Only the created/open pair is bumped
/// under a record shard guard; everything else is updated outside of any guard.
/// Snapshots copy each record under its shard's read guard, which keeps every
/// copied record internally consistent while the set of records as a whole may
/// drift slightly from the counters during churn.
use crate::config::RegistryConfig;
use crate::core::{
    AggregatedFlowStats, AggregationPolicy, BackendTarget, ConnectionId, ConnectionRecord,
    ErrorCategory, ErrorCounts, RecordMutation, TargetFlowStats,
};
use crate::error::{FlowError, FlowResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fnv::FnvBuildHasher;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, trace};

/// Registry lifecycle, reported as unavailable to queries outside `Running`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryLifecycle {
    Starting,
    Running,
    ShuttingDown,
}

impl RegistryLifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RegistryLifecycle::Starting,
            1 => RegistryLifecycle::Running,
            _ => RegistryLifecycle::ShuttingDown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RegistryLifecycle::Starting => 0,
            RegistryLifecycle::Running => 1,
            RegistryLifecycle::ShuttingDown => 2,
        }
    }
}

impl fmt::Display for RegistryLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryLifecycle::Starting => write!(f, "starting"),
            RegistryLifecycle::Running => write!(f, "running"),
            RegistryLifecycle::ShuttingDown => write!(f, "shutting down"),
        }
    }
}

/// Atomic counter set; one global instance plus one per target
#[derive(Debug, Default)]
struct FlowCounters {
    total_created: AtomicU64,
    currently_open: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    total_requests: AtomicU64,
    errors_connect: AtomicU64,
    errors_timeout: AtomicU64,
    errors_network: AtomicU64,
    errors_protocol: AtomicU64,
}

impl FlowCounters {
    fn connection_opened(&self) {
        self.total_created.fetch_add(1, Ordering::Relaxed);
        self.currently_open.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        // Never wrap below zero
        let _ = self
            .currently_open
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |open| {
                open.checked_sub(1)
            });
    }

    fn add_traffic(&self, mutation: &RecordMutation) {
        if mutation.bytes_sent != 0 {
            self.bytes_sent.fetch_add(mutation.bytes_sent, Ordering::Relaxed);
        }
        if mutation.bytes_received != 0 {
            self.bytes_received
                .fetch_add(mutation.bytes_received, Ordering::Relaxed);
        }
        if mutation.requests != 0 {
            self.total_requests.fetch_add(mutation.requests, Ordering::Relaxed);
        }
    }

    fn add_error(&self, category: ErrorCategory) {
        let counter = match category {
            ErrorCategory::Connect => &self.errors_connect,
            ErrorCategory::Timeout => &self.errors_timeout,
            ErrorCategory::Network => &self.errors_network,
            ErrorCategory::Protocol => &self.errors_protocol,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn load(&self) -> AggregatedFlowStats {
        AggregatedFlowStats {
            total_created: self.total_created.load(Ordering::Relaxed),
            currently_open: self.currently_open.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            errors: ErrorCounts {
                connect: self.errors_connect.load(Ordering::Relaxed),
                timeout: self.errors_timeout.load(Ordering::Relaxed),
                network: self.errors_network.load(Ordering::Relaxed),
                protocol: self.errors_protocol.load(Ordering::Relaxed),
            },
        }
    }
}

/// Everything `snapshot_all` copies out of the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullFlowCapture {
    pub stats: AggregatedFlowStats,
    pub targets: Vec<TargetFlowStats>,
    pub connections: Vec<ConnectionRecord>,
}

/// Concurrent accounting structure for every live outbound connection
pub struct FlowRegistry {
    records: DashMap<ConnectionId, ConnectionRecord, FnvBuildHasher>,
    per_target: DashMap<BackendTarget, Arc<FlowCounters>, FnvBuildHasher>,
    global: FlowCounters,
    policy: AggregationPolicy,
    next_id: AtomicU64,
    lifecycle: AtomicU8,
}

impl FlowRegistry {
    /// Create a registry that is immediately queryable
    pub fn new(policy: AggregationPolicy) -> Self {
        Self::with_lifecycle(policy, RegistryLifecycle::Running, 0, None)
    }

    /// Create a registry that reports unavailable until `mark_running` is called
    pub fn starting(policy: AggregationPolicy) -> Self {
        Self::with_lifecycle(policy, RegistryLifecycle::Starting, 0, None)
    }

    /// Create a running registry sized from configuration
    pub fn from_config(config: &RegistryConfig) -> FlowResult<Self> {
        config.validate()?;
        Ok(Self::with_lifecycle(
            config.aggregation,
            RegistryLifecycle::Running,
            config.initial_capacity,
            Some(config.shard_amount),
        ))
    }

    fn with_lifecycle(
        policy: AggregationPolicy,
        lifecycle: RegistryLifecycle,
        capacity: usize,
        shard_amount: Option<usize>,
    ) -> Self {
        let records = match shard_amount {
            Some(shards) => DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                FnvBuildHasher::default(),
                shards,
            ),
            None => DashMap::with_capacity_and_hasher(capacity, FnvBuildHasher::default()),
        };

        Self {
            records,
            per_target: DashMap::with_hasher(FnvBuildHasher::default()),
            global: FlowCounters::default(),
            policy,
            next_id: AtomicU64::new(1),
            lifecycle: AtomicU8::new(lifecycle.as_u8()),
        }
    }

    /// Allocate the next process-unique connection id
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn policy(&self) -> AggregationPolicy {
        self.policy
    }

    pub fn lifecycle(&self) -> RegistryLifecycle {
        RegistryLifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    /// Transition `Starting -> Running`. Has no effect once shutdown began.
    pub fn mark_running(&self) {
        let _ = self.lifecycle.compare_exchange(
            RegistryLifecycle::Starting.as_u8(),
            RegistryLifecycle::Running.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Stop answering queries. Mutations keep being accepted.
    pub fn begin_shutdown(&self) {
        self.lifecycle
            .store(RegistryLifecycle::ShuttingDown.as_u8(), Ordering::Release);
        debug!("Flow registry shutting down with {} live connections", self.live_count());
    }

    /// Insert a new record and bump the created/open counters
    ///
    /// The counters are bumped while the shard write guard is still held, so an
    /// `unregister` of the same id can only ever observe a counted record.
    pub fn register(&self, record: ConnectionRecord) -> FlowResult<()> {
        let id = record.id;
        let target = match self.records.entry(id) {
            Entry::Occupied(_) => {
                error!("Duplicate registration of connection {}", id);
                debug_assert!(false, "Duplicate registration of connection {}", id);
                return Err(FlowError::DuplicateConnection { id });
            }
            Entry::Vacant(slot) => {
                let target = record.target.clone();
                self.global.connection_opened();
                if let Some(counters) = self.target_counters(&target) {
                    counters.connection_opened();
                }
                slot.insert(record);
                target
            }
        };

        debug!("Registered connection {} to {}", id, target);
        Ok(())
    }

    /// Apply a mutation to a live record. Returns false if the id is gone.
    pub fn update(&self, id: ConnectionId, mutation: RecordMutation) -> bool {
        let target = {
            let Some(mut record) = self.records.get_mut(&id) else {
                trace!("Update for connection {} ignored: not registered", id);
                return false;
            };
            record.apply(&mutation, SystemTime::now());
            if mutation.has_traffic() && self.policy == AggregationPolicy::PerTarget {
                Some(record.target.clone())
            } else {
                None
            }
        };

        if mutation.has_traffic() {
            self.global.add_traffic(&mutation);
            if let Some(counters) = target.and_then(|t| self.target_counters(&t)) {
                counters.add_traffic(&mutation);
            }
        }

        trace!("Updated connection {}: {:?}", id, mutation);
        true
    }

    /// Remove a record. Unregistering an absent id is a no-op.
    pub fn unregister(&self, id: ConnectionId) -> Option<ConnectionRecord> {
        let (_, record) = self.records.remove(&id)?;

        self.global.connection_closed();
        if let Some(counters) = self.target_counters(&record.target) {
            counters.connection_closed();
        }

        debug!("Unregistered connection {} to {}", id, record.target);
        Some(record)
    }

    /// Count an error against the global and per-target counters
    pub fn record_error(&self, target: &BackendTarget, category: ErrorCategory) {
        self.global.add_error(category);
        if let Some(counters) = self.target_counters(target) {
            counters.add_error(category);
        }
    }

    /// Copy of a single live record
    pub fn get(&self, id: ConnectionId) -> Option<ConnectionRecord> {
        self.records.get(&id).map(|record| record.value().clone())
    }

    /// Number of entries currently in the record map
    pub fn live_count(&self) -> usize {
        self.records.len()
    }

    /// Aggregated counters plus copies of every live record
    pub fn snapshot_all(&self) -> FlowResult<FullFlowCapture> {
        self.ensure_running()?;

        let stats = self.global.load();
        let connections: Vec<ConnectionRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut targets: Vec<TargetFlowStats> = self
            .per_target
            .iter()
            .map(|entry| TargetFlowStats {
                target: entry.key().clone(),
                stats: entry.value().load(),
            })
            .collect();
        targets.sort_by(|a, b| a.target.host.cmp(&b.target.host));

        Ok(FullFlowCapture {
            stats,
            targets,
            connections,
        })
    }

    /// Aggregated counters only; never touches the record map
    pub fn snapshot_aggregated_only(&self) -> FlowResult<AggregatedFlowStats> {
        self.ensure_running()?;
        Ok(self.global.load())
    }

    pub(crate) fn ensure_running(&self) -> FlowResult<()> {
        match self.lifecycle() {
            RegistryLifecycle::Running => Ok(()),
            lifecycle => Err(FlowError::Unavailable { lifecycle }),
        }
    }

    fn target_counters(&self, target: &BackendTarget) -> Option<Arc<FlowCounters>> {
        if self.policy == AggregationPolicy::Global {
            return None;
        }
        if let Some(counters) = self.per_target.get(target) {
            return Some(Arc::clone(counters.value()));
        }
        let counters = self
            .per_target
            .entry(target.clone())
            .or_insert_with(|| Arc::new(FlowCounters::default()));
        Some(Arc::clone(counters.value()))
    }
}

impl Default for FlowRegistry {
    fn default() -> Self {
        Self::new(AggregationPolicy::default())
    }
}

impl fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowRegistry")
            .field("live", &self.live_count())
            .field("policy", &self.policy)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
