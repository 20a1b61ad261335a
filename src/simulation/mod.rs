//! Traffic simulation subsystem.
//!
//! # Data Flow
//! ```text
//! SimulationConfig
//!     → runner.rs: generate a plan per connection (risky or safe, request heads)
//!     → one task per connection, bounded by a semaphore:
//!         start? → fetch × N (hold a WorkerGuard for the service time) → close
//!     → report.rs: aggregate placements, affinity violations and errors
//! ```
//!
//! # Design Decisions
//! - Workers are `SimulatedPool` slots, so idle/busy state comes from real in-flight requests
//! - Connection ids are recycled lowest-first to exercise affinity cleanup
//! - The report measures against a fixed partition layout, for every strategy

pub mod report;
pub mod runner;

pub use report::SimulationReport;
pub use runner::Simulation;
