//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DispatchConfig (validated, immutable)
//!     → dispatcher, classifier, simulation built from it
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new config sent to the running command
//!     → classifier rules swapped atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only classifier rules apply on reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::ClassifierConfig;
pub use schema::DispatchConfig;
pub use schema::DispatcherConfig;
pub use schema::ObservabilityConfig;
pub use schema::SimulationConfig;
pub use schema::StrategyKind;
pub use schema::WorkersConfig;
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
