//! Identifier key generation.

use std::fmt;

/// A composite rate limit identifier.
///
/// The key is composed of a scope (policy or action name) followed by the
/// caller's partitioning parts, joined with `:`. Empty parts are skipped so
/// that a missing tenant id does not produce `scope::user`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    rendered: String,
}

impl RateLimitKey {
    /// Start a key for the given scope.
    pub fn new(scope: &str) -> Self {
        Self {
            rendered: scope.trim().to_string(),
        }
    }

    /// Append a partitioning part (user id, IP, tenant id, ...).
    pub fn with(mut self, part: &str) -> Self {
        let part = part.trim();
        if part.is_empty() {
            return self;
        }
        if !self.rendered.is_empty() {
            self.rendered.push(':');
        }
        self.rendered.push_str(part);
        self
    }

    /// The rendered identifier.
    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    pub fn is_empty(&self) -> bool {
        self.rendered.is_empty()
    }
}

impl From<&str> for RateLimitKey {
    fn from(identifier: &str) -> Self {
        Self::new(identifier)
    }
}

impl AsRef<str> for RateLimitKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}
