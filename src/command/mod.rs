/// `proxyStatus` diagnostic command
///
/// Thin adapter between the command dispatcher and the flow reporter: resolves
/// caller privilege through the injected policy, reads the requested tier from
/// the request document and renders the snapshot into a response envelope.
/// The command always succeeds from the client's point of view; an unavailable
/// registry is signalled with `"available": false`.
use crate::error::FlowResult;
use crate::report::{CallerIdentity, ElevationPolicy, FlowReporter, FlowSnapshot, Verbosity};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Request field carrying the requested verbosity tier
pub const DUMP_CONN_TYPE_FIELD: &str = "dumpConnType";

pub struct ProxyStatusCommand {
    reporter: FlowReporter,
    policy: Arc<dyn ElevationPolicy>,
}

impl ProxyStatusCommand {
    pub const NAME: &'static str = "proxyStatus";

    pub fn new(reporter: FlowReporter, policy: Arc<dyn ElevationPolicy>) -> Self {
        Self { reporter, policy }
    }

    pub fn help(&self) -> &'static str {
        "get proxyStats"
    }

    /// Only runs against the admin database
    pub fn admin_only(&self) -> bool {
        true
    }

    pub fn allowed_on_secondary(&self) -> bool {
        true
    }

    pub fn supports_write_concern(&self) -> bool {
        false
    }

    /// No authorization check; detail is limited by redaction instead
    pub fn requires_privileges(&self) -> bool {
        false
    }

    /// Requested tier from a request document
    pub fn requested_verbosity(request: &Value) -> Verbosity {
        Verbosity::from_request_field(request.get(DUMP_CONN_TYPE_FIELD))
    }

    pub fn run(&self, caller: &CallerIdentity, request: &Value) -> FlowResult<Value> {
        let elevated = self.policy.has_elevated_diagnostics_capability(caller);
        let requested = Self::requested_verbosity(request);
        debug!(
            "{} requested by {} (elevated: {}, {}: {})",
            Self::NAME,
            caller.user.as_deref().unwrap_or("<anonymous>"),
            elevated,
            DUMP_CONN_TYPE_FIELD,
            requested
        );

        let snapshot = self.reporter.query(requested, elevated);
        render_envelope(&snapshot)
    }
}

/// Serialize a snapshot into the command's response envelope
pub fn render_envelope(snapshot: &FlowSnapshot) -> FlowResult<Value> {
    let mut body = Map::new();
    body.insert("ok".to_string(), json!(1));
    body.insert("available".to_string(), json!(snapshot.is_available()));

    if let Some(verbosity) = snapshot.verbosity() {
        body.insert(DUMP_CONN_TYPE_FIELD.to_string(), json!(verbosity.as_str()));
    }

    match snapshot {
        FlowSnapshot::Unavailable | FlowSnapshot::None => {}
        FlowSnapshot::Aggregated { stats } => {
            body.insert("aggregated".to_string(), serde_json::to_value(stats)?);
        }
        FlowSnapshot::All {
            stats,
            targets,
            connections,
        } => {
            body.insert("aggregated".to_string(), serde_json::to_value(stats)?);
            body.insert("targets".to_string(), serde_json::to_value(targets)?);
            body.insert("connections".to_string(), serde_json::to_value(connections)?);
        }
    }

    Ok(Value::Object(body))
}
