/// Connection-pool side of flow accounting
///
/// The pool owns its sockets; this module hands it a guard per connection that
/// keeps the registry entry in step with the socket's lifecycle. Dropping the
/// guard removes the entry, so an evicted or panicked connection never leaks
/// an open count.
use crate::core::{
    BackendTarget, ConnectionId, ConnectionRecord, ConnectionState, ErrorCategory, FlowRegistry,
    RecordMutation,
};
use crate::error::FlowResult;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Per-connection statistics handed back when a tracked connection closes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub requests_issued: u64,
    pub connection_duration_ms: u64,
}

/// Cloneable handle the connection pool uses to open tracked connections
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    registry: Arc<FlowRegistry>,
}

impl ConnectionTracker {
    pub fn new(registry: Arc<FlowRegistry>) -> Self {
        Self { registry }
    }

    /// Register a new connection in the `Connecting` state
    pub fn open(&self, target: BackendTarget) -> FlowResult<TrackedConnection> {
        let id = self.registry.next_connection_id();
        self.registry
            .register(ConnectionRecord::new(id, target.clone()))?;

        Ok(TrackedConnection {
            id,
            target,
            registry: Arc::clone(&self.registry),
            opened_at: Instant::now(),
            stats: ConnectionStats::default(),
            closed: false,
        })
    }

    /// Count a failed connection attempt that never produced a record
    pub fn connect_failed(&self, target: &BackendTarget, category: ErrorCategory) {
        self.registry.record_error(target, category);
    }

    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }
}

/// RAII guard for one live outbound connection
#[derive(Debug)]
pub struct TrackedConnection {
    id: ConnectionId,
    target: BackendTarget,
    registry: Arc<FlowRegistry>,
    opened_at: Instant,
    stats: ConnectionStats,
    closed: bool,
}

impl TrackedConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn target(&self) -> &BackendTarget {
        &self.target
    }

    /// Handshake finished; the connection is parked in the pool
    pub fn mark_established(&self) {
        self.registry
            .update(self.id, RecordMutation::state(ConnectionState::Idle));
    }

    /// Checked out of the pool by a worker
    pub fn begin_request(&self) {
        self.registry
            .update(self.id, RecordMutation::state(ConnectionState::InUse));
    }

    /// Request round trip completed; counters and the return to `Idle` land together
    pub fn finish_request(&mut self, bytes_sent: u64, bytes_received: u64) {
        self.stats.bytes_sent += bytes_sent;
        self.stats.bytes_received += bytes_received;
        self.stats.requests_issued += 1;
        self.registry.update(
            self.id,
            RecordMutation::traffic(bytes_sent, bytes_received, 1)
                .with_state(ConnectionState::Idle),
        );
    }

    /// Count an error observed on this connection
    pub fn record_error(&self, category: ErrorCategory) {
        self.registry.record_error(&self.target, category);
    }

    /// Close the connection and return its statistics
    pub fn close(mut self) -> ConnectionStats {
        self.release();
        self.stats.connection_duration_ms = duration_ms(self.opened_at.elapsed());
        self.stats.clone()
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.registry
            .update(self.id, RecordMutation::state(ConnectionState::Closing));
        self.registry.unregister(self.id);
        debug!(
            "Connection {} to {} released after {} requests",
            self.id, self.target, self.stats.requests_issued
        );
    }
}

impl Drop for TrackedConnection {
    fn drop(&mut self) {
        self.release();
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
