//! Gate request handling for the sidecar protocol.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::TurnstileError;
use crate::gate::{GateOutcome, RateLimitHeaders, RequestGate};

/// A request received from a caller, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GateRequest {
    /// Check and consume one admission
    Check { policy: String, identity: String },
    /// Clear an identity's history under a policy
    Reset { policy: String, identity: String },
    /// List the configured policies
    Policies,
}

/// A single policy as reported by the `policies` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySummary {
    pub name: String,
    pub max_requests: u32,
    pub window_ms: u64,
}

/// A response written back to the caller, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateResponse {
    Decision {
        policy: String,
        identity: String,
        allowed: bool,
        status: u16,
        #[serde(flatten)]
        headers: RateLimitHeaders,
    },
    Reset {
        policy: String,
        identity: String,
    },
    Policies {
        policies: Vec<PolicySummary>,
    },
    Error {
        message: String,
    },
}

impl GateResponse {
    fn error(err: &TurnstileError) -> Self {
        GateResponse::Error {
            message: err.to_string(),
        }
    }
}

/// Executes sidecar requests against a [`RequestGate`].
#[derive(Debug, Clone)]
pub struct GateService {
    gate: RequestGate,
}

impl GateService {
    pub fn new(gate: RequestGate) -> Self {
        Self { gate }
    }

    /// Handle one raw input line. Blank lines produce no response.
    pub fn handle_line(&self, line: &str) -> Option<GateResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match serde_json::from_str::<GateRequest>(line) {
            Ok(request) => Some(self.handle(request)),
            Err(e) => {
                warn!(error = %e, "Received malformed gate request");
                Some(GateResponse::error(&TurnstileError::Json(e)))
            }
        }
    }

    /// Handle one decoded request.
    #[instrument(skip(self))]
    pub fn handle(&self, request: GateRequest) -> GateResponse {
        match request {
            GateRequest::Check { policy, identity } => match self.gate.admit(&policy, &identity) {
                Ok(outcome) => {
                    debug!(allowed = outcome.is_admitted(), "Gate decision made");
                    let status = outcome.status_code();
                    let allowed = outcome.is_admitted();
                    let headers = match outcome {
                        GateOutcome::Admitted(h) | GateOutcome::TooManyRequests(h) => h,
                    };
                    GateResponse::Decision {
                        policy,
                        identity,
                        allowed,
                        status,
                        headers,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Rejected gate check");
                    GateResponse::error(&e)
                }
            },
            GateRequest::Reset { policy, identity } => match self.gate.release(&policy, &identity) {
                Ok(()) => GateResponse::Reset { policy, identity },
                Err(e) => {
                    warn!(error = %e, "Rejected gate reset");
                    GateResponse::error(&e)
                }
            },
            GateRequest::Policies => GateResponse::Policies {
                policies: self
                    .gate
                    .policies()
                    .iter()
                    .map(|(name, config)| PolicySummary {
                        name: name.to_string(),
                        max_requests: config.max_requests(),
                        window_ms: config.window_ms(),
                    })
                    .collect(),
            },
        }
    }
}
