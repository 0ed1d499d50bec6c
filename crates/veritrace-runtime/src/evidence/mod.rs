//! Evidence resolution for the retrieval step.
//!
//! # Core Principle
//! The search tool's own return value is the evidence. What the model
//! restates about it is a fallback, checked against the store where
//! possible, and raw reply text is the last resort.

mod resolver;

pub use resolver::{EvidenceResolver, RestatementError};
