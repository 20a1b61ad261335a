//! Request risk classification.
//!
//! # Data Flow
//! ```text
//! First packet of an unrouted connection
//!     → dispatch::request (request line + host)
//!     → RiskClassifier::is_risky(request_line, domain)
//!         - rules.rs: compiled from [classifier] config
//!           → matcher.rs (host / path prefix / method)
//!         - or any closure supplied by the embedding server
//!     → risky: confine to the risky partition
//! ```
//!
//! # Design Decisions
//! - Classifiers are pure predicates: no I/O, no side effects
//! - An empty domain is a normal input, not an error
//! - Rule sets are swapped atomically on reload; readers never block

pub mod matcher;
pub mod rules;

pub use matcher::RequestLine;
pub use rules::RuleClassifier;

/// Decides whether a request should be isolated on the risky partition.
pub trait RiskClassifier: Send + Sync {
    /// `request_line` is the first line of the request, `domain` the Host
    /// header value or empty when absent.
    fn is_risky(&self, request_line: &str, domain: &str) -> bool;
}

impl<F> RiskClassifier for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn is_risky(&self, request_line: &str, domain: &str) -> bool {
        self(request_line, domain)
    }
}
