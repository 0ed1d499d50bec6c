//! Built-in demonstration evidence.
//!
//! Four policy checks mapped to the internal document chunks that answer
//! them, standing in for a vector search index.

/// Policy checks the demo mapping is keyed by.
pub const MOCK_POLICY_CHECKS: [&str; 4] = [
    "Verify that PII is masked in development and testing environments.",
    "Verify that user account data is purged within 90 days of closure.",
    "Verify that every PII access is logged to a central, immutable audit database.",
    "Verify that third-party APIs for data processing are documented in the vendor contract database.",
];

/// Internal document chunks as `(id, text)`.
pub const MOCK_INTERNAL_DOCS: [(&str, &str); 4] = [
    (
        "AUDIT-SYS-DOC",
        "All internal database queries involving PII trigger a write to the 'ImmutableLedger' table. **No PII is ever used in QA/testing environments.**",
    ),
    (
        "SOP-101",
        "Our new account closure script marks the account as inactive and deletes the user data after **95 days**. We use a single, mutable log file for all data access events.",
    ),
    (
        "API-v3-Spec",
        "The /user-data/ endpoint uses the vendor 'QuickAnalytics' for data processing, but this **is not tracked** in the contracts DB, as it was a rapid integration.",
    ),
    (
        "LOGGING-ARCH-V1",
        "All successful PII access events (read or write) generate an entry in the **ImmutableLedger**, which is backed by a secure, append-only database.",
    ),
];

/// Check index -> document index.
pub const MOCK_SEARCH_MAPPING: [(usize, usize); 4] = [(0, 0), (1, 1), (2, 3), (3, 2)];
