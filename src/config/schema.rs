//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};

use crate::dispatch::OverflowPolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DispatchConfig {
    /// Affinity table and resolution strategy settings.
    pub dispatcher: DispatcherConfig,

    /// Risk classification rules.
    pub classifier: ClassifierConfig,

    /// Worker pool size.
    pub workers: WorkersConfig,

    /// Simulated traffic for the `simulate` command.
    pub simulation: SimulationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl DispatchConfig {
    /// Whether `update` changes settings that only apply on restart.
    ///
    /// Classifier rules reload live and the other sections only matter at
    /// startup, so only dispatcher and worker settings are compared.
    pub fn requires_restart(&self, update: &DispatchConfig) -> bool {
        self.workers.count != update.workers.count
            || self.dispatcher.max_connections != update.dispatcher.max_connections
            || self.dispatcher.risky_workers_percent != update.dispatcher.risky_workers_percent
            || self.dispatcher.strategy != update.dispatcher.strategy
            || self.dispatcher.overflow != update.dispatcher.overflow
    }
}

/// Resolution strategy used on affinity misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    RiskPartitioned,
    RoundRobin,
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "risk_partitioned" => Ok(StrategyKind::RiskPartitioned),
            "round_robin" => Ok(StrategyKind::RoundRobin),
            other => Err(format!(
                "unknown strategy '{other}', expected risk_partitioned or round_robin"
            )),
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Affinity table capacity; match the server's max connection limit.
    pub max_connections: usize,

    /// Fraction in [0, 1] placing the safe/risky partition boundary.
    pub risky_workers_percent: f64,

    pub strategy: StrategyKind,

    /// Behaviour when the affinity table is full.
    pub overflow: OverflowPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            risky_workers_percent: 0.3,
            strategy: StrategyKind::RiskPartitioned,
            overflow: OverflowPolicy::Reject,
        }
    }
}

/// Risk rules. A request is risky when any entry matches.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Hosts (case-insensitive, port ignored).
    pub risky_hosts: Vec<String>,

    /// Path prefixes (case-sensitive, must start with '/').
    pub risky_path_prefixes: Vec<String>,

    /// Request methods (case-insensitive).
    pub risky_methods: Vec<String>,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Number of worker processes.
    pub count: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { count: 8 }
    }
}

/// Simulated traffic configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Total connections to open.
    pub connections: usize,

    /// Connections open at the same time.
    pub concurrency: usize,

    /// Requests sent on each connection before it closes.
    pub requests_per_connection: usize,

    /// Probability in [0, 1] that a generated request targets a risky path.
    pub risky_ratio: f64,

    /// Processing time of a safe request in milliseconds.
    pub safe_service_ms: u64,

    /// Processing time of a risky request in milliseconds.
    pub risky_service_ms: u64,

    /// Host header values to pick from.
    pub hosts: Vec<String>,

    /// Paths used for safe requests.
    pub safe_paths: Vec<String>,

    /// Paths used for risky requests.
    pub risky_paths: Vec<String>,

    /// Send a start event before the first request, pinning the connection
    /// before its traffic can be classified.
    pub announce_connections: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            connections: 200,
            concurrency: 32,
            requests_per_connection: 4,
            risky_ratio: 0.2,
            safe_service_ms: 5,
            risky_service_ms: 50,
            hosts: vec!["app.example.com".to_string()],
            safe_paths: vec!["/".to_string()],
            risky_paths: vec!["/export".to_string()],
            announce_connections: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: DispatchConfig = toml::from_str("").unwrap();
        assert_eq!(config.dispatcher.max_connections, 10_000);
        assert_eq!(config.dispatcher.strategy, StrategyKind::RiskPartitioned);
        assert_eq!(config.workers.count, 8);
        assert!(config.classifier.risky_hosts.is_empty());
    }

    #[test]
    fn test_parse_sections() {
        let config: DispatchConfig = toml::from_str(
            r#"
            [dispatcher]
            max_connections = 512
            risky_workers_percent = 0.25
            strategy = "round_robin"
            overflow = "unpinned"

            [classifier]
            risky_path_prefixes = ["/v1/functions"]

            [workers]
            count = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.dispatcher.max_connections, 512);
        assert_eq!(config.dispatcher.risky_workers_percent, 0.25);
        assert_eq!(config.dispatcher.strategy, StrategyKind::RoundRobin);
        assert_eq!(config.dispatcher.overflow, OverflowPolicy::Unpinned);
        assert_eq!(config.classifier.risky_path_prefixes, vec!["/v1/functions"]);
        assert_eq!(config.workers.count, 16);
        // Untouched sections keep defaults
        assert_eq!(config.simulation.concurrency, 32);
    }

    #[test]
    fn test_requires_restart() {
        let running = DispatchConfig::default();

        let mut update = running.clone();
        update.classifier.risky_methods = vec!["POST".into()];
        update.simulation.connections = 5;
        assert!(!running.requires_restart(&update));

        update.dispatcher.overflow = OverflowPolicy::Unpinned;
        assert!(running.requires_restart(&update));

        let mut update = running.clone();
        update.workers.count = 2;
        assert!(running.requires_restart(&update));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("round_robin".parse::<StrategyKind>(), Ok(StrategyKind::RoundRobin));
        assert!("random".parse::<StrategyKind>().is_err());
    }
}
