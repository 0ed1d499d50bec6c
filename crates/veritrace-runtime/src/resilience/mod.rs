//! Resilience patterns for veritrace-runtime.
//!
//! This module provides:
//! - Retry with exponential backoff for rate-limited backend calls
//! - Token usage accounting with an optional global ceiling

mod budget;
mod retry;

pub use budget::{TokenBudget, UsageTracker};
pub use retry::{RateLimitBackoff, RetryPolicy};
pub use veritrace_core::LlmUsage;
