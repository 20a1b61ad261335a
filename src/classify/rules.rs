//! Configuration-driven risk classifier with atomic reload.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::classify::matcher::{
    AnyOf, HostMatcher, MethodMatcher, PathPrefixMatcher, RequestLine, RequestMatcher,
};
use crate::classify::RiskClassifier;
use crate::config::ClassifierConfig;
use crate::observability::metrics;

/// Compiled form of a `[classifier]` section.
#[derive(Debug, Default)]
struct RuleSet {
    risky: AnyOf,
}

impl RuleSet {
    fn compile(config: &ClassifierConfig) -> Self {
        let mut risky = AnyOf::default();
        for host in &config.risky_hosts {
            risky.push(Box::new(HostMatcher::new(host.as_str())));
        }
        for prefix in &config.risky_path_prefixes {
            risky.push(Box::new(PathPrefixMatcher::new(prefix.as_str())));
        }
        for method in &config.risky_methods {
            risky.push(Box::new(MethodMatcher::new(method.as_str())));
        }
        Self { risky }
    }
}

/// Classifies a request as risky when any configured rule matches.
///
/// Clones share the same rules, so a reload through any clone is seen by all.
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    rules: Arc<ArcSwap<RuleSet>>,
}

impl RuleClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let rules = RuleSet::compile(config);
        tracing::debug!(rules = rules.risky.len(), "Risk rules compiled");
        Self {
            rules: Arc::new(ArcSwap::from_pointee(rules)),
        }
    }

    /// Replace the active rules. In-flight classifications finish on the old set.
    pub fn reload(&self, config: &ClassifierConfig) {
        let rules = RuleSet::compile(config);
        tracing::info!(rules = rules.risky.len(), "Risk rules reloaded");
        self.rules.store(Arc::new(rules));
        metrics::record_classifier_reload();
    }

    /// Number of active rules.
    pub fn rule_count(&self) -> usize {
        self.rules.load().risky.len()
    }
}

impl RiskClassifier for RuleClassifier {
    fn is_risky(&self, request_line: &str, domain: &str) -> bool {
        let request = RequestLine::parse(request_line);
        self.rules.load().risky.matches(&request, domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClassifierConfig {
        ClassifierConfig {
            risky_hosts: vec!["reports.example.com".into()],
            risky_path_prefixes: vec!["/v1/functions".into(), "/export".into()],
            risky_methods: vec![],
        }
    }

    #[test]
    fn test_rules_match() {
        let classifier = RuleClassifier::new(&config());
        assert_eq!(classifier.rule_count(), 3);

        assert!(classifier.is_risky("GET / HTTP/1.1", "reports.example.com"));
        assert!(classifier.is_risky(
            "POST /v1/functions/abc/executions HTTP/1.1",
            "api.example.com"
        ));
        assert!(classifier.is_risky("GET /export?format=csv HTTP/1.1", ""));
        assert!(!classifier.is_risky("GET /v1/health HTTP/1.1", "api.example.com"));
    }

    #[test]
    fn test_empty_rules_never_risky() {
        let classifier = RuleClassifier::new(&ClassifierConfig::default());
        assert_eq!(classifier.rule_count(), 0);
        assert!(!classifier.is_risky("POST /anything HTTP/1.1", "any.example.com"));
        assert!(!classifier.is_risky("", ""));
    }

    #[test]
    fn test_clones_share_reloads() {
        let classifier = RuleClassifier::new(&ClassifierConfig::default());
        let in_dispatcher = classifier.clone();
        classifier.reload(&config());
        assert!(in_dispatcher.is_risky("GET /export HTTP/1.1", ""));
    }

    #[test]
    fn test_reload_swaps_rules() {
        let classifier = RuleClassifier::new(&config());
        assert!(!classifier.is_risky("PUT /v1/storage HTTP/1.1", ""));

        classifier.reload(&ClassifierConfig {
            risky_hosts: vec![],
            risky_path_prefixes: vec![],
            risky_methods: vec!["put".into()],
        });

        assert_eq!(classifier.rule_count(), 1);
        assert!(classifier.is_risky("PUT /v1/storage HTTP/1.1", ""));
        assert!(!classifier.is_risky("GET /export HTTP/1.1", ""));
    }
}
