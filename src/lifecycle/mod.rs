//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//!
//! Shutdown (shutdown.rs):
//!     Trigger → every subscribed task stops taking new work → Exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel fans the stop signal out to all tasks
//! - Tasks finish the connection they are serving; no forced abort

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
