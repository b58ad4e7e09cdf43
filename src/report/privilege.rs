/// Caller identity and the elevated-diagnostics capability check
///
/// Authentication happens elsewhere. This module only receives who the caller
/// is and answers whether that caller may see per-connection detail.
use crate::config::{ConfigError, ReportingConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A role qualified by the database it was granted on, written `role@db`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleName {
    pub role: String,
    pub db: String,
}

impl RoleName {
    pub fn new<S: Into<String>>(role: S, db: S) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.role, self.db)
    }
}

impl FromStr for RoleName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((role, db)) if !role.is_empty() && !db.is_empty() && !db.contains('@') => {
                Ok(RoleName::new(role, db))
            }
            _ => Err(ConfigError::ValidationError(format!(
                "Invalid role name '{}', expected role@db",
                s
            ))),
        }
    }
}

/// Authenticated caller as supplied by the session layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user: Option<String>,
    pub roles: Vec<RoleName>,
}

impl CallerIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated<S: Into<String>>(user: S, roles: Vec<RoleName>) -> Self {
        Self {
            user: Some(user.into()),
            roles,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn has_role(&self, role: &RoleName) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Decides whether a caller may view per-connection identifying detail
pub trait ElevationPolicy: Send + Sync {
    fn has_elevated_diagnostics_capability(&self, caller: &CallerIdentity) -> bool;
}

impl<F> ElevationPolicy for F
where
    F: Fn(&CallerIdentity) -> bool + Send + Sync,
{
    fn has_elevated_diagnostics_capability(&self, caller: &CallerIdentity) -> bool {
        self(caller)
    }
}

/// Grants elevation to authenticated callers holding any of the configured roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleElevationPolicy {
    roles: Vec<RoleName>,
}

impl RoleElevationPolicy {
    pub fn new(roles: Vec<RoleName>) -> Self {
        Self { roles }
    }

    pub fn from_config(config: &ReportingConfig) -> Result<Self, ConfigError> {
        let roles = config
            .elevated_roles
            .iter()
            .map(|role| role.parse())
            .collect::<Result<Vec<RoleName>, _>>()?;
        Ok(Self::new(roles))
    }

    pub fn roles(&self) -> &[RoleName] {
        &self.roles
    }
}

impl Default for RoleElevationPolicy {
    fn default() -> Self {
        Self::new(vec![RoleName::new("root", "admin")])
    }
}

impl ElevationPolicy for RoleElevationPolicy {
    fn has_elevated_diagnostics_capability(&self, caller: &CallerIdentity) -> bool {
        caller.is_authenticated() && self.roles.iter().any(|role| caller.has_role(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_name_parsing() {
        let role: RoleName = "root@admin".parse().unwrap();
        assert_eq!(role, RoleName::new("root", "admin"));
        assert_eq!(role.to_string(), "root@admin");

        assert!("root".parse::<RoleName>().is_err());
        assert!("@admin".parse::<RoleName>().is_err());
        assert!("root@".parse::<RoleName>().is_err());
        assert!("a@b@c".parse::<RoleName>().is_err());
    }

    #[test]
    fn test_default_policy_requires_root_admin() {
        let policy = RoleElevationPolicy::default();

        let root = CallerIdentity::authenticated("ops", vec![RoleName::new("root", "admin")]);
        assert!(policy.has_elevated_diagnostics_capability(&root));

        let reader = CallerIdentity::authenticated("app", vec![RoleName::new("read", "app")]);
        assert!(!policy.has_elevated_diagnostics_capability(&reader));

        // Role on the wrong database does not count
        let misplaced = CallerIdentity::authenticated("x", vec![RoleName::new("root", "app")]);
        assert!(!policy.has_elevated_diagnostics_capability(&misplaced));
    }

    #[test]
    fn test_unauthenticated_never_elevated() {
        let policy = RoleElevationPolicy::default();
        let caller = CallerIdentity {
            user: None,
            roles: vec![RoleName::new("root", "admin")],
        };
        assert!(!policy.has_elevated_diagnostics_capability(&caller));
        assert!(!policy.has_elevated_diagnostics_capability(&CallerIdentity::anonymous()));
    }

    #[test]
    fn test_policy_from_config() {
        let config = ReportingConfig {
            elevated_roles: vec!["root@admin".to_string(), "clusterMonitor@admin".to_string()],
        };
        let policy = RoleElevationPolicy::from_config(&config).unwrap();
        assert_eq!(policy.roles().len(), 2);

        let monitor =
            CallerIdentity::authenticated("mon", vec![RoleName::new("clusterMonitor", "admin")]);
        assert!(policy.has_elevated_diagnostics_capability(&monitor));

        let bad = ReportingConfig {
            elevated_roles: vec!["nope".to_string()],
        };
        assert!(RoleElevationPolicy::from_config(&bad).is_err());
    }

    #[test]
    fn test_closure_policy() {
        let allow_all = |_: &CallerIdentity| true;
        assert!(allow_all.has_elevated_diagnostics_capability(&CallerIdentity::anonymous()));
    }
}
