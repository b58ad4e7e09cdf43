//! flowstat - privilege-aware outbound connection flow reporting for sharded-cluster proxies
//!
//! The proxy's connection pool records every outbound connection in a shared
//! `FlowRegistry`. Operators query it through the `proxyStatus` command, which
//! returns one of three detail tiers:
//! 1. `none`: liveness probe only
//! 2. `aggregated`: process-wide counters
//! 3. `all`: counters, a per-target breakdown and every live connection
//!
//! The requested tier is capped by caller privilege; only elevated callers
//! ever see backend addresses or connection ids.
pub mod command;
pub mod config;
pub mod core;
pub mod error;
pub mod report;
pub mod simulation;
pub mod utils;

use crate::command::ProxyStatusCommand;
use crate::config::Config;
use crate::core::{ConnectionTracker, FlowRegistry};
use crate::error::FlowResult;
use crate::report::{FlowReporter, RoleElevationPolicy};
use std::sync::Arc;
use tracing::info;

/// One registry shared by the connection pool and the reporting command
pub struct FlowStat {
    registry: Arc<FlowRegistry>,
    tracker: ConnectionTracker,
    reporter: FlowReporter,
    command: ProxyStatusCommand,
}

impl FlowStat {
    /// Wire registry, tracker, reporter and command from configuration
    pub fn from_config(config: &Config) -> FlowResult<Self> {
        config.validate()?;

        let registry = Arc::new(FlowRegistry::from_config(&config.registry)?);
        let policy = RoleElevationPolicy::from_config(&config.reporting)?;
        info!(
            "Flow registry ready ({:?} aggregation, {} shards); elevated roles: {}",
            config.registry.aggregation,
            config.registry.shard_amount,
            policy
                .roles()
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let reporter = FlowReporter::new(Arc::clone(&registry));
        let command = ProxyStatusCommand::new(reporter.clone(), Arc::new(policy));

        Ok(Self {
            tracker: ConnectionTracker::new(Arc::clone(&registry)),
            registry,
            reporter,
            command,
        })
    }

    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }

    /// Handle for the connection pool
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    pub fn reporter(&self) -> &FlowReporter {
        &self.reporter
    }

    pub fn command(&self) -> &ProxyStatusCommand {
        &self.command
    }

    /// Stop answering flow queries; the pool may keep closing connections
    pub fn shutdown(&self) {
        info!("Shutting down flow reporting");
        self.registry.begin_shutdown();
    }
}
