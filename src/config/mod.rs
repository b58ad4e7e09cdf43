/// Configuration management for flowstat
use crate::core::{AggregationPolicy, BackendRole, BackendTarget};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main flowstat configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Flow registry configuration
    pub registry: RegistryConfig,
    /// Reporting configuration
    pub reporting: ReportingConfig,
    /// Simulated connection pool configuration
    pub simulation: SimulationConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Flow registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Counter grouping (per_target or global)
    pub aggregation: AggregationPolicy,
    /// Expected number of concurrently open connections
    pub initial_capacity: usize,
    /// Number of lock shards in the record map (power of two, greater than 1)
    pub shard_amount: usize,
}

impl RegistryConfig {
    /// Check the record map shard count dashmap will be built with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let shards = self.shard_amount;
        if shards < 2 || !shards.is_power_of_two() {
            return Err(ConfigError::ValidationError(format!(
                "shard_amount must be a power of two greater than 1, got {}",
                shards
            )));
        }
        Ok(())
    }
}

/// Reporting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Roles (role@db) whose holders see per-connection detail
    pub elevated_roles: Vec<String>,
}

/// Backend target as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub host: String,
    pub role: BackendRole,
}

impl From<&TargetConfig> for BackendTarget {
    fn from(target: &TargetConfig) -> Self {
        BackendTarget::new(target.host.clone(), target.role)
    }
}

/// Simulated connection pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of concurrent worker tasks
    pub workers: usize,
    /// Connections each worker opens
    pub connections_per_worker: usize,
    /// Requests issued on each connection
    pub requests_per_connection: usize,
    /// Fraction of connection attempts that fail (0.0 - 1.0)
    pub error_rate: f64,
    /// Backend targets the workers connect to
    pub targets: Vec<TargetConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, text)
    pub format: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            aggregation: AggregationPolicy::PerTarget,
            initial_capacity: 1024,
            shard_amount: 64,
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            elevated_roles: vec!["root@admin".to_string()],
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            connections_per_worker: 8,
            requests_per_connection: 16,
            error_rate: 0.05,
            targets: vec![
                TargetConfig {
                    host: "127.0.0.1:27018".to_string(),
                    role: BackendRole::Shard,
                },
                TargetConfig {
                    host: "127.0.0.1:27019".to_string(),
                    role: BackendRole::ConfigServer,
                },
            ],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry.validate()?;

        // Validate reporting config
        if self.reporting.elevated_roles.is_empty() {
            return Err(ConfigError::ValidationError(
                "elevated_roles cannot be empty".to_string(),
            ));
        }
        for role in &self.reporting.elevated_roles {
            role.parse::<crate::report::RoleName>()?;
        }

        // Validate simulation config
        let sim = &self.simulation;
        if sim.targets.is_empty() {
            return Err(ConfigError::ValidationError(
                "simulation targets cannot be empty".to_string(),
            ));
        }
        for target in &sim.targets {
            if target.host.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "simulation target host cannot be empty".to_string(),
                ));
            }
        }
        if sim.workers == 0 {
            return Err(ConfigError::ValidationError(
                "workers must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&sim.error_rate) {
            return Err(ConfigError::ValidationError(format!(
                "error_rate must be between 0.0 and 1.0, got {}",
                sim.error_rate
            )));
        }

        // Validate logging config
        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }

    /// Create example configuration file for a small sharded cluster
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let target = |host: &str, role: BackendRole| TargetConfig {
            host: host.to_string(),
            role,
        };

        let config = Config {
            simulation: SimulationConfig {
                targets: vec![
                    target("10.0.1.10:27018", BackendRole::Shard),
                    target("10.0.1.11:27018", BackendRole::Shard),
                    target("10.0.1.12:27018", BackendRole::ReplicaSetMember),
                    target("10.0.1.20:27019", BackendRole::ConfigServer),
                ],
                ..Default::default()
            },
            ..Default::default()
        };

        config.save_to_file(path)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shard_amount_validation() {
        let mut config = Config::default();

        config.registry.shard_amount = 1;
        assert!(config.validate().is_err());

        config.registry.shard_amount = 48;
        assert!(config.validate().is_err());

        config.registry.shard_amount = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reporting_validation() {
        let mut config = Config::default();

        config.reporting.elevated_roles.clear();
        assert!(config.validate().is_err());

        config.reporting.elevated_roles = vec!["root".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_simulation_validation() {
        let mut config = Config::default();
        config.simulation.error_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.simulation.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.simulation.targets.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_logging_validation() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("aggregation = \"per_target\""));

        let parsed_config: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed_config, config);
    }

    #[test]
    fn test_config_file_operations() {
        let temp_file = NamedTempFile::new().unwrap();

        Config::create_example_config(temp_file.path()).unwrap();
        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded_config.simulation.targets.len(), 4);
        assert_eq!(
            loaded_config.simulation.targets[3].role,
            BackendRole::ConfigServer
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load_from_file("/nonexistent/flowstat.toml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
