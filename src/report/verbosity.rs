/// Verbosity tiers for flow reports
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Requested report detail, ordered `None < Aggregated < All`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Liveness probe only
    #[default]
    None,
    /// Process-wide counters
    Aggregated,
    /// Counters, per-target breakdown and every live connection
    All,
}

impl Verbosity {
    pub const ALL_TIERS: [Verbosity; 3] = [Verbosity::None, Verbosity::Aggregated, Verbosity::All];

    /// Parse a tier name. Anything unrecognized degrades to `None`.
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "none" => Verbosity::None,
            "aggregated" => Verbosity::Aggregated,
            "all" => Verbosity::All,
            _ => Verbosity::None,
        }
    }

    /// Read a tier from a request field. Missing or non-string values mean `None`.
    pub fn from_request_field(field: Option<&Value>) -> Self {
        match field {
            Some(Value::String(value)) => Self::parse_lenient(value),
            _ => Verbosity::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::None => "none",
            Verbosity::Aggregated => "aggregated",
            Verbosity::All => "all",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
