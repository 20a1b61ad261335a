//! Sticky, risk-aware connection dispatch for multi-worker servers.

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod observability;
pub mod simulation;
pub mod workers;

pub use classify::{RiskClassifier, RuleClassifier};
pub use config::schema::DispatchConfig;
pub use dispatch::{
    build_dispatcher, ConnectionId, Dispatch, DispatchError, DispatchEvent, DispatchKind,
    RiskPartitioned, StickyDispatcher, WorkerId,
};
pub use lifecycle::Shutdown;
pub use workers::{WorkerStatus, WorkerStatusOracle};
