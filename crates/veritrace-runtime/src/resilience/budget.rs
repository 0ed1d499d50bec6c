//! Token budget management for backend calls.
//!
//! One [`UsageTracker`] is shared by every invoker in a run, so the report
//! can carry the run's total usage and an optional global ceiling can stop
//! further calls once it is spent.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use veritrace_core::LlmUsage;

use crate::providers::TokenUsage;

/// Token budget for a scope.
pub struct TokenBudget {
    /// Maximum tokens allowed
    pub max_tokens: u32,

    used: AtomicU32,
}

impl TokenBudget {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            used: AtomicU32::new(0),
        }
    }

    pub fn can_afford(&self, tokens: u32) -> bool {
        self.remaining() >= tokens
    }

    pub fn record(&self, tokens: u32) {
        self.used.fetch_add(tokens, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> u32 {
        self.max_tokens.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.used.store(0, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for TokenBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBudget")
            .field("max_tokens", &self.max_tokens)
            .field("used", &self.used())
            .finish()
    }
}

/// Usage accounting for one audit run.
#[derive(Debug, Default)]
pub struct UsageTracker {
    /// Global ceiling, if any
    global: Option<TokenBudget>,

    usage: RwLock<LlmUsage>,
}

impl UsageTracker {
    /// Tracker without a ceiling.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Tracker that refuses calls once `max_tokens` are spent.
    pub fn with_limit(max_tokens: u32) -> Self {
        Self {
            global: Some(TokenBudget::new(max_tokens)),
            usage: RwLock::new(LlmUsage::default()),
        }
    }

    pub fn new(max_tokens: Option<u32>) -> Self {
        match max_tokens {
            Some(max) => Self::with_limit(max),
            None => Self::unlimited(),
        }
    }

    /// Whether a call estimated at `tokens` fits the remaining budget.
    pub fn can_afford(&self, tokens: u32) -> bool {
        self.global
            .as_ref()
            .map(|b| b.can_afford(tokens))
            .unwrap_or(true)
    }

    /// Record usage after a backend call.
    pub fn record(&self, usage: &TokenUsage, model: &str) {
        if let Some(budget) = &self.global {
            budget.record(usage.total());
        }
        self.usage
            .write()
            .add(usage.prompt_tokens, usage.completion_tokens, model);
    }

    /// Snapshot of accumulated usage.
    pub fn usage(&self) -> LlmUsage {
        self.usage.read().clone()
    }

    /// Remaining global budget, `None` when unlimited.
    pub fn remaining(&self) -> Option<u32> {
        self.global.as_ref().map(|b| b.remaining())
    }

    pub fn reset(&self) {
        if let Some(budget) = &self.global {
            budget.reset();
        }
        *self.usage.write() = LlmUsage::default();
    }
}
