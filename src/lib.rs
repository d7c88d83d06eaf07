//! Turnstile - Fixed-Window Rate Limiting
//!
//! This crate implements the in-memory fixed-window rate limiter shared by the
//! practice-management backend's request handlers and its client-facing action
//! triggers. It provides the limiter core, named policy presets, a periodic
//! cleanup sweeper, consumer adapters and a JSON-lines sidecar.

pub mod config;
pub mod error;
pub mod gate;
pub mod ratelimit;
pub mod sidecar;

pub use error::{Result, TurnstileError};
