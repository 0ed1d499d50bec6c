//! Accumulated model usage for an audit run.

use serde::{Deserialize, Serialize};

/// Accumulated LLM usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    /// Total tokens used
    pub total_tokens: u32,

    /// Prompt/input tokens
    pub prompt_tokens: u32,

    /// Completion/output tokens
    pub completion_tokens: u32,

    /// Number of backend calls made, tool rounds included
    pub llm_calls: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    /// Add one backend call's token counts.
    pub fn add(&mut self, prompt_tokens: u32, completion_tokens: u32, model: &str) {
        self.prompt_tokens += prompt_tokens;
        self.completion_tokens += completion_tokens;
        self.total_tokens += prompt_tokens + completion_tokens;
        self.llm_calls += 1;
        self.estimated_cost += Self::estimate_cost(prompt_tokens, completion_tokens, model);
    }

    /// Fold another usage record into this one.
    pub fn merge(&mut self, other: &LlmUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.llm_calls += other.llm_calls;
        self.estimated_cost += other.estimated_cost;
    }

    fn estimate_cost(prompt_tokens: u32, completion_tokens: u32, model: &str) -> f64 {
        // USD per million tokens
        let (input_rate, output_rate) = match model {
            m if m.contains("gemini-2.5-pro") => (1.25, 10.0),
            m if m.contains("gemini-2.5-flash") => (0.30, 2.50),
            m if m.contains("gemini") => (0.10, 0.40),
            m if m.contains("opus") => (5.0, 25.0),
            m if m.contains("haiku") => (1.0, 5.0),
            _ => (3.0, 15.0), // Sonnet pricing
        };

        (prompt_tokens as f64 / 1_000_000.0) * input_rate
            + (completion_tokens as f64 / 1_000_000.0) * output_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_accumulates() {
        let mut usage = LlmUsage::default();
        usage.add(1_000_000, 0, "claude-sonnet-4-5");
        usage.add(0, 1_000_000, "claude-sonnet-4-5");

        assert_eq!(usage.total_tokens, 2_000_000);
        assert_eq!(usage.llm_calls, 2);
        assert!((usage.estimated_cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_gemini_pricing() {
        let mut usage = LlmUsage::default();
        usage.add(1_000_000, 1_000_000, "gemini-2.5-flash");
        assert!((usage.estimated_cost - 2.80).abs() < 1e-9);
    }

    #[test]
    fn test_merge() {
        let mut a = LlmUsage::default();
        a.add(10, 5, "x");
        let mut b = LlmUsage::default();
        b.add(1, 1, "x");
        a.merge(&b);
        assert_eq!(a.total_tokens, 17);
        assert_eq!(a.llm_calls, 2);
    }
}
