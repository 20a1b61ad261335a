//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges via the `metrics` facade)
//!
//! Consumers:
//!     → Log aggregation (stdout, plain or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Dispatch hot path only touches atomic counters and disabled-by-level log events
//! - Without an installed recorder, metric calls are no-ops (tests, embedding hosts)
//! - Log level from config, overridden by `RUST_LOG`

pub mod logging;
pub mod metrics;
