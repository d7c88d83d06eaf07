//! Adapters that turn limiter decisions into caller-facing outcomes.
//!
//! [`RequestGate`] is used by request-handling entry points keyed by caller
//! identity or IP: a denial becomes a "too many requests" outcome carrying
//! header-style metadata. [`ActionThrottle`] is used by client-facing action
//! triggers keyed by action name: a denial becomes a notice for the user.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{PolicyTable, RateLimitConfig, RateLimitDecision, RateLimitKey, RateLimiter};

/// Header-style metadata describing the caller's budget after a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitHeaders {
    /// The policy ceiling
    pub limit: u32,
    /// Admissions left in the current window
    pub remaining: u32,
    /// Window reset as an ISO-8601 timestamp
    pub reset_time: String,
    /// Whole seconds until the caller may retry; only set on denial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl RateLimitHeaders {
    fn from_decision(decision: &RateLimitDecision, config: &RateLimitConfig, now: u64) -> Self {
        let retry_after_secs = if decision.allowed {
            None
        } else {
            Some(ceil_secs(decision.retry_after(now).as_millis() as u64))
        };

        Self {
            limit: config.max_requests(),
            remaining: decision.remaining,
            reset_time: decision.reset_time_iso(),
            retry_after_secs,
        }
    }

    /// Key/value pairs ready to be attached to a response.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_time.clone()),
        ];
        if let Some(secs) = self.retry_after_secs {
            pairs.push(("Retry-After", secs.to_string()));
        }
        pairs
    }
}

/// Milliseconds rounded up to whole seconds, never below one for a pending window.
fn ceil_secs(millis: u64) -> u64 {
    millis.div_ceil(1000).max(1)
}

/// The result of passing a request through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The request may proceed; it has been counted.
    Admitted(RateLimitHeaders),
    /// The request must be rejected with "too many requests".
    TooManyRequests(RateLimitHeaders),
}

impl GateOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, GateOutcome::Admitted(_))
    }

    /// HTTP-style status for the outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            GateOutcome::Admitted(_) => 200,
            GateOutcome::TooManyRequests(_) => 429,
        }
    }

    pub fn headers(&self) -> &RateLimitHeaders {
        match self {
            GateOutcome::Admitted(headers) | GateOutcome::TooManyRequests(headers) => headers,
        }
    }
}

/// Server-side request gate.
///
/// Identifiers are partitioned by policy, so the same caller has independent
/// budgets for, say, `auth` and `export`.
#[derive(Debug, Clone)]
pub struct RequestGate {
    limiter: Arc<RateLimiter>,
    policies: Arc<PolicyTable>,
}

impl RequestGate {
    pub fn new(limiter: Arc<RateLimiter>, policies: Arc<PolicyTable>) -> Self {
        Self { limiter, policies }
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Check and consume one admission for `identity` under `policy`.
    pub fn admit(&self, policy: &str, identity: &str) -> Result<GateOutcome> {
        let config = self.policies.require(policy)?;
        let key = Self::key(policy, identity)?;

        let decision = self.limiter.check(key.as_str(), config);
        let headers = RateLimitHeaders::from_decision(&decision, config, self.limiter.now_millis());

        if decision.allowed {
            Ok(GateOutcome::Admitted(headers))
        } else {
            info!(
                policy = %policy,
                identifier = %key,
                reset_time = %headers.reset_time,
                "Too many requests"
            );
            Ok(GateOutcome::TooManyRequests(headers))
        }
    }

    /// Clear `identity`'s history under `policy`, e.g. after a successful sign-in.
    pub fn release(&self, policy: &str, identity: &str) -> Result<()> {
        self.policies.require(policy)?;
        let key = Self::key(policy, identity)?;
        self.limiter.reset(key.as_str());
        Ok(())
    }

    fn key(policy: &str, identity: &str) -> Result<RateLimitKey> {
        if identity.trim().is_empty() {
            return Err(TurnstileError::InvalidIdentifier);
        }
        Ok(RateLimitKey::new(&PolicyTable::normalize(policy)).with(identity))
    }
}

/// A user-visible notice explaining why an action did not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleNotice {
    pub action: String,
    pub retry_after_secs: u64,
    pub message: String,
}

impl fmt::Display for ThrottleNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Client-side throttle for user-triggered actions.
#[derive(Debug, Clone)]
pub struct ActionThrottle {
    limiter: Arc<RateLimiter>,
    config: RateLimitConfig,
}

impl ActionThrottle {
    pub fn new(limiter: Arc<RateLimiter>, config: RateLimitConfig) -> Self {
        Self { limiter, config }
    }

    /// Try to run `action`. A denial yields a notice to show the user.
    pub fn attempt(&self, action: &str) -> std::result::Result<(), ThrottleNotice> {
        let decision = self.limiter.check(action, &self.config);
        if decision.allowed {
            return Ok(());
        }

        let retry_after_secs = ceil_secs(decision.retry_after(self.limiter.now_millis()).as_millis() as u64);
        debug!(action = %action, retry_after_secs = retry_after_secs, "Action throttled");

        Err(ThrottleNotice {
            action: action.to_string(),
            retry_after_secs,
            message: format!(
                "Too many attempts. Please wait {} before trying again.",
                describe_wait(retry_after_secs)
            ),
        })
    }
}

fn describe_wait(secs: u64) -> String {
    match secs {
        1 => "1 second".to_string(),
        s if s < 60 => format!("{} seconds", s),
        s => {
            let minutes = s.div_ceil(60);
            if minutes == 1 {
                "1 minute".to_string()
            } else {
                format!("{} minutes", minutes)
            }
        }
    }
}
