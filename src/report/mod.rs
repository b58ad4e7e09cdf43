/// Tiered, privilege-aware flow reporting
pub mod privilege;
pub mod redaction;
pub mod snapshot;
pub mod verbosity;

pub use privilege::{CallerIdentity, ElevationPolicy, RoleElevationPolicy, RoleName};
pub use redaction::{effective_verbosity, permitted_verbosity, redact, Privilege};
pub use snapshot::{FlowSnapshot, SnapshotBuilder};
pub use verbosity::Verbosity;

use crate::core::FlowRegistry;
use std::sync::Arc;
use tracing::debug;

/// Single query entry point combining the snapshot builder and redaction
#[derive(Debug, Clone)]
pub struct FlowReporter {
    registry: Arc<FlowRegistry>,
}

impl FlowReporter {
    pub fn new(registry: Arc<FlowRegistry>) -> Self {
        Self { registry }
    }

    /// Snapshot at `min(verbosity, permitted)` detail
    pub fn query(&self, verbosity: Verbosity, is_elevated: bool) -> FlowSnapshot {
        let privilege = Privilege::from_elevated(is_elevated);
        let effective = effective_verbosity(verbosity, privilege);
        if effective != verbosity {
            debug!(
                "Flow query capped from {} to {} for {:?} caller",
                verbosity, effective, privilege
            );
        }

        let snapshot = SnapshotBuilder::new(&self.registry).build(effective);
        redact(snapshot, privilege)
    }

    /// Same as `query`, taking the raw tier name
    pub fn query_str(&self, verbosity: &str, is_elevated: bool) -> FlowSnapshot {
        self.query(Verbosity::parse_lenient(verbosity), is_elevated)
    }

    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }
}
