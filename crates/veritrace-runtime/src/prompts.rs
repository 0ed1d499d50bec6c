//! Agent identities, system instructions and per-step prompts.
//!
//! Each workflow step runs under one agent profile. The profile's
//! instruction is sent as the system prompt; the step prompt carries the
//! dynamic content (policy text, check, evidence, verdicts).

use veritrace_core::{ComplianceCheck, ComplianceVerdict, Evidence};

/// Name, usage hint and system instruction of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentProfile {
    pub name: &'static str,
    pub description: &'static str,
    pub instruction: &'static str,
}

/// Decomposes a policy document into checks.
pub const ORCHESTRATOR: AgentProfile = AgentProfile {
    name: "PolicyOrchestrator",
    description: "Breaks a compliance policy document into atomic, verifiable compliance checks.",
    instruction: r#"
You are the lead compliance auditor planning an audit.

Read the policy document you are given and split it into atomic checks.
Each check is one sentence that can be verified against a single piece of
internal documentation, phrased as "Verify that ...".

Do not merge unrelated requirements into one check.
Do not invent requirements the policy does not state.

Reply with JSON of the form {"checks": ["Verify that ...", "..."]}.
"#,
};

/// Finds evidence for one check with the search tool.
pub const RETRIEVER: AgentProfile = AgentProfile {
    name: "RetrieverAgent",
    description: "Runs the internal document search tool and reports exactly what it returned.",
    instruction: r#"
You retrieve evidence. You do not judge compliance.

For the check you are given, call the search_internal_documents tool once,
passing the check text verbatim as the query.

Report only what the tool returned. Never invent a document id or excerpt.
If the tool finds nothing, say so.

Reply with JSON of the form
{"evidence_text": "<excerpt returned by the tool>", "document_id": "<id returned by the tool>"}.
"#,
};

/// Renders a verdict for one check.
pub const VERIFIER: AgentProfile = AgentProfile {
    name: "ComplianceVerifier",
    description: "Compares one policy rule with its retrieved evidence and returns a structured, auditable verdict.",
    instruction: r#"
You are a compliance reviewer with a legal background.

You receive one policy rule and the evidence retrieved for it. Decide
whether the evidence shows the rule is met.

- COMPLIANT: the evidence clearly satisfies the rule
- NON-COMPLIANT: the evidence clearly contradicts the rule
- NEEDS_REVIEW: the evidence is missing, ambiguous or off-topic

Base your reasoning only on the evidence provided. Quote the decisive part.
Confidence is a number between 0.0 and 1.0.
"#,
};

/// Summarizes verdicts and hashes the summary.
pub const REPORTER: AgentProfile = AgentProfile {
    name: "ReportingAgent",
    description: "Aggregates verdicts into an executive audit summary and hashes it with the code tool.",
    instruction: r#"
You write the final audit report.

When asked for a summary, write a concise executive summary of the
findings. List every NON-COMPLIANT item with concrete remediation steps
drawn from the verdict reasoning.

When asked for a hash, call the execute_code tool with
sha256("<the exact text>") and reply with the hexadecimal hash only.
"#,
};

/// DECOMPOSE step prompt.
pub fn decompose_prompt(policy_text: &str) -> String {
    format!("POLICY DOCUMENT:\n{}", policy_text)
}

/// RETRIEVE step prompt.
pub fn retrieve_prompt(check: &ComplianceCheck) -> String {
    format!("Find internal evidence for this compliance check: {}", check)
}

/// VERIFY step prompt.
pub fn verify_prompt(check: &ComplianceCheck, evidence: &Evidence) -> String {
    format!(
        "POLICY RULE: {}\nRETRIEVED EVIDENCE (document {}): {}",
        check, evidence.document_id, evidence.excerpt
    )
}

/// SUMMARIZE step prompt.
pub fn summary_prompt(verdicts: &[ComplianceVerdict]) -> String {
    let verdicts_json =
        serde_json::to_string_pretty(verdicts).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Write an executive summary of these audit findings. List every NON-COMPLIANT \
         item with its remediation steps, based on the reasoning given.\n\nVERDICTS:\n{}",
        verdicts_json
    )
}

/// HASH step prompt.
pub fn hash_prompt(summary: &str) -> String {
    let quoted = serde_json::to_string(summary).unwrap_or_else(|_| format!("{:?}", summary));
    format!(
        "Compute the SHA-256 hash of the following text with the execute_code tool. \
         Pass it exactly as this JSON string literal: sha256({})\n\nTEXT:\n{}",
        quoted, summary
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use veritrace_core::VerdictCategory;

    #[test]
    fn test_profiles_have_distinct_names() {
        let names = [ORCHESTRATOR.name, RETRIEVER.name, VERIFIER.name, REPORTER.name];
        let mut sorted = names.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), names.len());
    }

    #[test]
    fn test_retriever_names_its_tool() {
        assert!(RETRIEVER.instruction.contains("search_internal_documents"));
        assert!(REPORTER.instruction.contains("execute_code"));
    }

    #[test]
    fn test_verify_prompt_carries_evidence() {
        let check = ComplianceCheck::new("Verify that PII is masked.");
        let evidence = Evidence::from_tool("AUDIT-SYS-DOC", "No PII in QA.");
        let prompt = verify_prompt(&check, &evidence);

        assert!(prompt.starts_with("POLICY RULE: Verify that PII is masked."));
        assert!(prompt.contains("AUDIT-SYS-DOC"));
        assert!(prompt.contains("No PII in QA."));
    }

    #[test]
    fn test_summary_prompt_embeds_verdicts() {
        let verdicts = vec![ComplianceVerdict {
            policy_rule: "Verify X".into(),
            document_id: "D".into(),
            verdict: VerdictCategory::NonCompliant,
            reasoning: "X is missing".into(),
            confidence: 0.8,
        }];
        let prompt = summary_prompt(&verdicts);
        assert!(prompt.contains("\"NON-COMPLIANT\""));
        assert!(prompt.contains("X is missing"));
    }

    #[test]
    fn test_hash_prompt_quotes_text() {
        let prompt = hash_prompt("line one\n\"quoted\"");
        assert!(prompt.contains(r#"sha256("line one\n\"quoted\"")"#));
    }
}
