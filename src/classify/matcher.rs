//! Request matching primitives for risk rules.
//!
//! # Responsibilities
//! - Split a request line into method and target
//! - Match host (exact, case-insensitive, port ignored)
//! - Match path prefix (case-sensitive, query ignored)
//! - Match method (case-insensitive)
//! - Combine conditions with AND / OR semantics
//!
//! # Design Decisions
//! - Matchers see only what the first packet carries: request line + host
//! - A malformed request line matches nothing except host rules
//! - No regex to guarantee O(n) matching

/// Method and target of a request line such as `GET /path?q=1 HTTP/1.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: &'a str,
    pub target: &'a str,
}

impl<'a> RequestLine<'a> {
    /// Parse a request line. Missing parts are returned empty.
    pub fn parse(line: &'a str) -> Self {
        let mut parts = line.split_whitespace();
        Self {
            method: parts.next().unwrap_or_default(),
            target: parts.next().unwrap_or_default(),
        }
    }

    /// Target without query string or fragment.
    pub fn path(&self) -> &'a str {
        let end = self
            .target
            .find(|c: char| c == '?' || c == '#')
            .unwrap_or(self.target.len());
        &self.target[..end]
    }
}

/// Trait for matching a request head against a condition.
pub trait RequestMatcher: Send + Sync + std::fmt::Debug {
    fn matches(&self, request: &RequestLine<'_>, domain: &str) -> bool;
}

/// Strip an optional `:port` suffix, leaving IPv6 literals intact.
fn host_without_port(domain: &str) -> &str {
    if domain.starts_with('[') {
        return domain.find(']').map(|end| &domain[..=end]).unwrap_or(domain);
    }
    match domain.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => domain,
    }
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl RequestMatcher for HostMatcher {
    fn matches(&self, _request: &RequestLine<'_>, domain: &str) -> bool {
        host_without_port(domain).eq_ignore_ascii_case(&self.expected_host)
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl RequestMatcher for PathPrefixMatcher {
    fn matches(&self, request: &RequestLine<'_>, _domain: &str) -> bool {
        let path = request.path();
        !path.is_empty() && path.starts_with(&self.prefix)
    }
}

/// Matches the request method.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    method: String,
}

impl MethodMatcher {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
        }
    }
}

impl RequestMatcher for MethodMatcher {
    fn matches(&self, request: &RequestLine<'_>, _domain: &str) -> bool {
        request.method.eq_ignore_ascii_case(&self.method)
    }
}

/// Combines matchers with AND semantics. Empty = always matches.
#[derive(Debug)]
pub struct AllOf {
    matchers: Vec<Box<dyn RequestMatcher>>,
}

impl AllOf {
    pub fn new(matchers: Vec<Box<dyn RequestMatcher>>) -> Self {
        Self { matchers }
    }
}

impl RequestMatcher for AllOf {
    fn matches(&self, request: &RequestLine<'_>, domain: &str) -> bool {
        self.matchers.iter().all(|m| m.matches(request, domain))
    }
}

/// Combines matchers with OR semantics. Empty = never matches.
#[derive(Debug, Default)]
pub struct AnyOf {
    matchers: Vec<Box<dyn RequestMatcher>>,
}

impl AnyOf {
    pub fn new(matchers: Vec<Box<dyn RequestMatcher>>) -> Self {
        Self { matchers }
    }

    pub fn push(&mut self, matcher: Box<dyn RequestMatcher>) {
        self.matchers.push(matcher);
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl RequestMatcher for AnyOf {
    fn matches(&self, request: &RequestLine<'_>, domain: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(request, domain))
    }
}
