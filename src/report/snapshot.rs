/// Snapshot building: one registry read per query, shaped by verbosity tier
use crate::core::{AggregatedFlowStats, ConnectionRecord, FlowRegistry, TargetFlowStats};
use crate::error::FlowError;
use crate::report::verbosity::Verbosity;
use tracing::warn;

/// Immutable, point-in-time result of one flow query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowSnapshot {
    /// Registry starting up or shutting down
    Unavailable,
    None,
    Aggregated {
        stats: AggregatedFlowStats,
    },
    All {
        stats: AggregatedFlowStats,
        targets: Vec<TargetFlowStats>,
        connections: Vec<ConnectionRecord>,
    },
}

impl FlowSnapshot {
    /// Tier this snapshot carries; `None` when the registry was unavailable
    pub fn verbosity(&self) -> Option<Verbosity> {
        match self {
            FlowSnapshot::Unavailable => None,
            FlowSnapshot::None => Some(Verbosity::None),
            FlowSnapshot::Aggregated { .. } => Some(Verbosity::Aggregated),
            FlowSnapshot::All { .. } => Some(Verbosity::All),
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, FlowSnapshot::Unavailable)
    }

    pub fn stats(&self) -> Option<&AggregatedFlowStats> {
        match self {
            FlowSnapshot::Aggregated { stats } | FlowSnapshot::All { stats, .. } => Some(stats),
            _ => None,
        }
    }

    pub fn targets(&self) -> &[TargetFlowStats] {
        match self {
            FlowSnapshot::All { targets, .. } => targets,
            _ => &[],
        }
    }

    /// Per-connection records; empty below the `All` tier
    pub fn connections(&self) -> &[ConnectionRecord] {
        match self {
            FlowSnapshot::All { connections, .. } => connections,
            _ => &[],
        }
    }
}

/// Translates a verbosity tier into the matching registry read
pub struct SnapshotBuilder<'a> {
    registry: &'a FlowRegistry,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(registry: &'a FlowRegistry) -> Self {
        Self { registry }
    }

    pub fn build(&self, verbosity: Verbosity) -> FlowSnapshot {
        let result = match verbosity {
            Verbosity::None => self.registry.ensure_running().map(|_| FlowSnapshot::None),
            Verbosity::Aggregated => self
                .registry
                .snapshot_aggregated_only()
                .map(|stats| FlowSnapshot::Aggregated { stats }),
            Verbosity::All => self.registry.snapshot_all().map(|capture| FlowSnapshot::All {
                stats: capture.stats,
                targets: capture.targets,
                connections: capture.connections,
            }),
        };

        match result {
            Ok(snapshot) => snapshot,
            Err(FlowError::Unavailable { lifecycle }) => {
                warn!("Flow snapshot requested while registry is {}", lifecycle);
                FlowSnapshot::Unavailable
            }
            Err(e) => {
                warn!("Flow snapshot failed: {}", e);
                FlowSnapshot::Unavailable
            }
        }
    }
}
