//! JSON-lines sidecar exposing the request gate to out-of-process callers.

mod server;
mod service;

pub use server::{LineServer, MAX_LINE_BYTES};
pub use service::{GateRequest, GateResponse, GateService, PolicySummary};
