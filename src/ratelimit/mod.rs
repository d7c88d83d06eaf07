//! Rate limiting logic and state management.

mod clock;
mod entry;
mod key;
mod limiter;
mod policy;
mod store;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::RateLimitEntry;
pub use key::RateLimitKey;
pub use limiter::{RateLimitDecision, RateLimiter, RateLimiterBuilder, DEFAULT_EVICTION_THRESHOLD};
pub use policy::{PolicyTable, Preset, RateLimitConfig};
pub use store::RateLimitStore;
pub use sweeper::{CleanupSweeper, DEFAULT_CLEANUP_INTERVAL};
