/// Privilege-based redaction of flow snapshots
///
/// The requested verbosity is a ceiling. The detail a caller actually gets is
/// `min(requested, permitted(privilege))`; standard callers are capped at
/// aggregated counters and never see targets or connection ids.
use crate::report::snapshot::FlowSnapshot;
use crate::report::verbosity::Verbosity;
use serde::Serialize;

/// Caller privilege as far as flow reporting is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    Standard,
    Elevated,
}

impl Privilege {
    pub fn from_elevated(is_elevated: bool) -> Self {
        if is_elevated {
            Privilege::Elevated
        } else {
            Privilege::Standard
        }
    }
}

/// Highest tier a caller with this privilege may receive
pub fn permitted_verbosity(privilege: Privilege) -> Verbosity {
    match privilege {
        Privilege::Elevated => Verbosity::All,
        Privilege::Standard => Verbosity::Aggregated,
    }
}

/// Tier actually served for a request
pub fn effective_verbosity(requested: Verbosity, privilege: Privilege) -> Verbosity {
    requested.min(permitted_verbosity(privilege))
}

/// Reshape a snapshot so it never exceeds what the privilege permits.
/// Whole sections are dropped; fields inside a record are never masked.
pub fn redact(snapshot: FlowSnapshot, privilege: Privilege) -> FlowSnapshot {
    match snapshot {
        FlowSnapshot::All { stats, .. } if permitted_verbosity(privilege) < Verbosity::All => {
            FlowSnapshot::Aggregated { stats }
        }
        other => other,
    }
}
