/// Core flow accounting types shared between the registry and the reporting layer
pub mod connection;
pub mod registry;

pub use connection::{ConnectionStats, ConnectionTracker, TrackedConnection};
pub use registry::{FlowRegistry, FullFlowCapture, RegistryLifecycle};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Process-unique identifier of an outbound connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Logical role of a backend node within the sharded cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendRole {
    Shard,
    ReplicaSetMember,
    ConfigServer,
    Other,
}

impl fmt::Display for BackendRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendRole::Shard => write!(f, "shard"),
            BackendRole::ReplicaSetMember => write!(f, "replica_set_member"),
            BackendRole::ConfigServer => write!(f, "config_server"),
            BackendRole::Other => write!(f, "other"),
        }
    }
}

/// Backend endpoint a connection is opened against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendTarget {
    pub host: String,
    pub role: BackendRole,
}

impl BackendTarget {
    pub fn new<S: Into<String>>(host: S, role: BackendRole) -> Self {
        Self {
            host: host.into(),
            role,
        }
    }

    pub fn shard<S: Into<String>>(host: S) -> Self {
        Self::new(host, BackendRole::Shard)
    }

    pub fn config_server<S: Into<String>>(host: S) -> Self {
        Self::new(host, BackendRole::ConfigServer)
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.host, self.role)
    }
}

/// Connection lifecycle state as seen by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Idle,
    InUse,
    Closing,
}

/// Accounting entry for one live outbound connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub target: BackendTarget,
    pub state: ConnectionState,
    #[serde(serialize_with = "crate::utils::serialize_epoch_millis")]
    pub created_at: SystemTime,
    #[serde(serialize_with = "crate::utils::serialize_epoch_millis")]
    pub last_activity_at: SystemTime,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub requests_issued: u64,
}

impl ConnectionRecord {
    /// Fresh record in the `Connecting` state with zeroed counters
    pub fn new(id: ConnectionId, target: BackendTarget) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            target,
            state: ConnectionState::Connecting,
            created_at: now,
            last_activity_at: now,
            bytes_sent: 0,
            bytes_received: 0,
            requests_issued: 0,
        }
    }

    /// Apply a mutation in place. Counter deltas saturate.
    pub fn apply(&mut self, mutation: &RecordMutation, now: SystemTime) {
        if let Some(state) = mutation.state {
            self.state = state;
        }
        self.bytes_sent = self.bytes_sent.saturating_add(mutation.bytes_sent);
        self.bytes_received = self.bytes_received.saturating_add(mutation.bytes_received);
        self.requests_issued = self.requests_issued.saturating_add(mutation.requests);
        self.last_activity_at = now;
    }
}

/// A single state/counter change applied to a live record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordMutation {
    pub state: Option<ConnectionState>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub requests: u64,
}

impl RecordMutation {
    pub fn state(state: ConnectionState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    pub fn traffic(bytes_sent: u64, bytes_received: u64, requests: u64) -> Self {
        Self {
            state: None,
            bytes_sent,
            bytes_received,
            requests,
        }
    }

    pub fn with_state(mut self, state: ConnectionState) -> Self {
        self.state = Some(state);
        self
    }

    /// True when the mutation carries counter deltas that must reach the aggregates
    pub fn has_traffic(&self) -> bool {
        self.bytes_sent != 0 || self.bytes_received != 0 || self.requests != 0
    }
}

/// Error categories counted in the aggregated stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Connect,
    Timeout,
    Network,
    Protocol,
}

/// Error counts by category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorCounts {
    pub connect: u64,
    pub timeout: u64,
    pub network: u64,
    pub protocol: u64,
}

impl ErrorCounts {
    pub fn total(&self) -> u64 {
        self.connect + self.timeout + self.network + self.protocol
    }
}

/// Process-wide cumulative flow counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregatedFlowStats {
    pub total_created: u64,
    pub currently_open: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub total_requests: u64,
    pub errors: ErrorCounts,
}

/// Cumulative flow counters for a single backend target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetFlowStats {
    pub target: BackendTarget,
    #[serde(flatten)]
    pub stats: AggregatedFlowStats,
}

/// How the registry groups cumulative counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Global counters plus one counter set per backend target
    #[default]
    PerTarget,
    /// Global counters only
    Global,
}
