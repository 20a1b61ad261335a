//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (fractions within [0, 1], counts > 0)
//! - Validate rule shapes (path prefixes are absolute)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatchConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::DispatchConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `dispatcher.max_connections`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

fn is_fraction(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &DispatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.dispatcher.max_connections == 0 {
        errors.push(ValidationError::new(
            "dispatcher.max_connections",
            "must be greater than 0",
        ));
    }
    if !is_fraction(config.dispatcher.risky_workers_percent) {
        errors.push(ValidationError::new(
            "dispatcher.risky_workers_percent",
            format!(
                "must be within [0, 1], got {}",
                config.dispatcher.risky_workers_percent
            ),
        ));
    }

    if config.workers.count == 0 {
        errors.push(ValidationError::new("workers.count", "must be greater than 0"));
    }

    for (i, prefix) in config.classifier.risky_path_prefixes.iter().enumerate() {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::new(
                format!("classifier.risky_path_prefixes[{i}]"),
                format!("'{prefix}' must start with '/'"),
            ));
        }
    }
    for (i, host) in config.classifier.risky_hosts.iter().enumerate() {
        if host.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("classifier.risky_hosts[{i}]"),
                "must not be empty",
            ));
        }
    }

    let sim = &config.simulation;
    if sim.concurrency == 0 {
        errors.push(ValidationError::new(
            "simulation.concurrency",
            "must be greater than 0",
        ));
    }
    if !is_fraction(sim.risky_ratio) {
        errors.push(ValidationError::new(
            "simulation.risky_ratio",
            format!("must be within [0, 1], got {}", sim.risky_ratio),
        ));
    }
    if sim.safe_paths.is_empty() {
        errors.push(ValidationError::new(
            "simulation.safe_paths",
            "must list at least one path",
        ));
    }
    if sim.risky_ratio > 0.0 && sim.risky_paths.is_empty() {
        errors.push(ValidationError::new(
            "simulation.risky_paths",
            "must list at least one path when risky_ratio > 0",
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&DispatchConfig::default()), Ok(()));
    }

    #[test]
    fn test_boundary_percentages_are_valid() {
        let mut config = DispatchConfig::default();
        config.dispatcher.risky_workers_percent = 0.0;
        assert!(validate_config(&config).is_ok());
        config.dispatcher.risky_workers_percent = 1.0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = DispatchConfig::default();
        config.dispatcher.max_connections = 0;
        config.dispatcher.risky_workers_percent = 1.5;
        config.workers.count = 0;
        config.classifier.risky_path_prefixes = vec!["export".into()];
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "not-an-addr".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "dispatcher.max_connections",
                "dispatcher.risky_workers_percent",
                "workers.count",
                "classifier.risky_path_prefixes[0]",
                "observability.metrics_address",
            ]
        );
    }

    #[test]
    fn test_nan_percent_rejected() {
        let mut config = DispatchConfig::default();
        config.dispatcher.risky_workers_percent = f64::NAN;
        assert!(validate_config(&config).is_err());
    }
}
