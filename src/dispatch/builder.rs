//! Dispatcher construction from configuration.

use std::sync::Arc;

use crate::classify::RuleClassifier;
use crate::config::{DispatcherConfig, StrategyKind};
use crate::dispatch::{
    Dispatch, DispatchError, ResolveWorker, RiskPartitioned, RoundRobin, StickyDispatcher,
};

/// Build the sticky dispatcher described by `config`.
///
/// `classifier` is only consulted by the risk-partitioned strategy. Keep a
/// clone of it to reload rules while the dispatcher is running.
pub fn build_dispatcher(
    config: &DispatcherConfig,
    classifier: RuleClassifier,
) -> Result<Arc<dyn Dispatch>, DispatchError> {
    let resolver: Box<dyn ResolveWorker> = match config.strategy {
        StrategyKind::RiskPartitioned => Box::new(RiskPartitioned::new(
            config.risky_workers_percent,
            classifier,
        )?),
        StrategyKind::RoundRobin => Box::new(RoundRobin::new()),
    };

    Ok(Arc::new(StickyDispatcher::with_overflow(
        config.max_connections,
        resolver,
        config.overflow,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use crate::dispatch::{ConnectionId, DispatchEvent};
    use crate::workers::{StaticWorkers, WorkerStatus};

    #[test]
    fn test_invalid_percent_fails() {
        let config = DispatcherConfig {
            risky_workers_percent: 1.2,
            ..DispatcherConfig::default()
        };
        let result = build_dispatcher(&config, RuleClassifier::new(&ClassifierConfig::default()));
        assert!(matches!(result, Err(DispatchError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_round_robin_ignores_percent_and_rules() {
        let config = DispatcherConfig {
            strategy: StrategyKind::RoundRobin,
            ..DispatcherConfig::default()
        };
        let dispatcher =
            build_dispatcher(&config, RuleClassifier::new(&ClassifierConfig::default())).unwrap();
        let workers = StaticWorkers::all(3, WorkerStatus::Busy);
        assert_eq!(
            dispatcher.dispatch_event(&workers, DispatchEvent::start(ConnectionId(1))),
            Ok(crate::dispatch::WorkerId(0))
        );
    }

    #[test]
    fn test_reload_reaches_built_dispatcher() {
        let classifier = RuleClassifier::new(&ClassifierConfig::default());
        let dispatcher =
            build_dispatcher(&DispatcherConfig::default(), classifier.clone()).unwrap();
        classifier.reload(&ClassifierConfig {
            risky_path_prefixes: vec!["/export".into()],
            ..ClassifierConfig::default()
        });

        // 10 workers at 0.3: risky traffic lands in 3..10 once the rule is active
        let workers = StaticWorkers::all(10, WorkerStatus::Busy);
        for fd in 0..20 {
            let worker = dispatcher
                .dispatch_event(
                    &workers,
                    DispatchEvent::fetch(ConnectionId(fd), b"GET /export HTTP/1.1\r\n\r\n"),
                )
                .unwrap();
            assert!(worker.index() >= 3);
        }
    }
}
