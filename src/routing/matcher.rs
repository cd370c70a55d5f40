//! Envelope head matching.
//!
//! # Responsibilities
//! - Decide whether a buffered request head came from our own ingress relay
//! - Combine rules with AND semantics
//!
//! # Design Decisions
//! - Rules are regexes over the request head text (request line + headers)
//! - Rules are compiled once at startup; matching never allocates per rule
//! - An empty rule set admits everything

use regex::Regex;

/// Trait for matching request heads against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the head matches this condition.
    fn matches(&self, head: &str) -> bool;
}

/// Matches the head against one regular expression.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    pattern: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl Matcher for RegexMatcher {
    fn matches(&self, head: &str) -> bool {
        self.pattern.is_match(head)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug, Default)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, head: &str) -> bool {
        self.matchers.iter().all(|m| m.matches(head))
    }
}

/// The allow-list applied by the egress relay to each inbound head.
#[derive(Debug)]
pub struct EnvelopePolicy {
    rules: AndMatcher,
}

impl EnvelopePolicy {
    /// Compile every rule; the first invalid pattern is returned as an error.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let matchers = patterns
            .iter()
            .map(|p| RegexMatcher::new(p.as_ref()).map(|m| Box::new(m) as Box<dyn Matcher>))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules: AndMatcher::new(matchers),
        })
    }

    /// Whether the head of `frame` (bytes up to the blank line) satisfies
    /// every rule.
    pub fn admits(&self, frame: &[u8]) -> bool {
        let head_end = crate::codec::envelope::head_len(frame).unwrap_or(frame.len());
        let head = String::from_utf8_lossy(&frame[..head_end]);
        self.rules.matches(&head)
    }
}
