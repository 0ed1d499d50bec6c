//! End-to-end audit runs against a scripted backend.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Agent, FakeAuditor};
use tempfile::TempDir;
use veritrace_core::store::MOCK_POLICY_CHECKS;
use veritrace_core::{sha256_hex, AuditReport, VerdictCategory};
use veritrace_runtime::config::OutputSettings;
use veritrace_runtime::{AuditWorkflow, FailurePolicy, RetryPolicy, WorkflowError, FALLBACK_CHECK};

const POLICY: &str = "\
1. PII must be masked in all non-production environments.
2. Closed accounts must be purged within 90 days.
3. Every access to PII must be logged to an immutable audit store.
4. Third-party processors must be listed in the vendor contract database.
";

fn policy_file(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("policy_document.txt");
    std::fs::write(&path, POLICY).unwrap();
    path
}

fn workflow(provider: Arc<FakeAuditor>, out: &TempDir) -> AuditWorkflow {
    AuditWorkflow::builder(provider)
        .retry(RetryPolicy::new(3, Duration::from_millis(10), Duration::ZERO))
        .output(OutputSettings {
            dir: out.path().join("reports"),
            ..OutputSettings::default()
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_full_audit_over_demo_store() {
    let dir = TempDir::new().unwrap();
    let provider = FakeAuditor::new();
    let outcome = workflow(provider.clone(), &dir)
        .run(policy_file(&dir))
        .await
        .unwrap();

    assert_eq!(outcome.verdicts.len(), 4);
    let categories: Vec<VerdictCategory> = outcome.verdicts.iter().map(|v| v.verdict).collect();
    assert_eq!(
        categories,
        vec![
            VerdictCategory::Compliant,
            VerdictCategory::NonCompliant,
            VerdictCategory::Compliant,
            VerdictCategory::NonCompliant,
        ]
    );
    assert_eq!(outcome.verdicts[1].document_id, "SOP-101");
    assert_eq!(outcome.tally.non_compliant, 2);
    assert_eq!(outcome.tally.overall(), VerdictCategory::NonCompliant);

    assert_eq!(outcome.report_hash, sha256_hex(&outcome.summary));
    assert!(outcome.hash_verified);
    assert!(outcome
        .final_text()
        .ends_with(&format!("Report Hash: {}", outcome.report_hash)));

    assert_eq!(provider.calls_to(Agent::Orchestrator), 1);
    // one search round and one answer per check
    assert_eq!(provider.calls_to(Agent::Retriever), 8);
    assert_eq!(provider.calls_to(Agent::Verifier), 4);
    assert_eq!(outcome.usage.llm_calls as usize, provider.call_count());
}

#[tokio::test]
async fn test_trace_step_labels() {
    let dir = TempDir::new().unwrap();
    let outcome = workflow(FakeAuditor::new(), &dir)
        .run(policy_file(&dir))
        .await
        .unwrap();

    let steps: Vec<&str> = outcome.trace.steps().collect();
    assert_eq!(
        steps,
        vec![
            "Orchestration",
            "Retrieval-0",
            "Verification-0",
            "Retrieval-1",
            "Verification-1",
            "Retrieval-2",
            "Verification-2",
            "Retrieval-3",
            "Verification-3",
            "Reporting",
            "Hashing",
        ]
    );

    let retrieval = &outcome.trace.entries()[3];
    assert_eq!(retrieval.check.as_deref(), Some(MOCK_POLICY_CHECKS[1]));
    assert_eq!(
        retrieval.metadata["tools"],
        serde_json::json!(["search_internal_documents"])
    );
    assert_eq!(
        retrieval.metadata["tool_calls"][0]["output"]["document_id"],
        "SOP-101"
    );
}

#[tokio::test]
async fn test_unparseable_decomposition_uses_fallback_check() {
    let dir = TempDir::new().unwrap();
    let provider = FakeAuditor::with_decomposition("Sure! The policy covers several areas.");
    let outcome = workflow(provider, &dir)
        .run(policy_file(&dir))
        .await
        .unwrap();

    assert_eq!(outcome.verdicts.len(), 1);
    let verdict = &outcome.verdicts[0];
    assert_eq!(verdict.policy_rule, FALLBACK_CHECK);
    assert_eq!(verdict.document_id, "Unknown");
    assert_eq!(verdict.verdict, VerdictCategory::NeedsReview);
}

#[tokio::test]
async fn test_blank_policy_audits_fallback_check() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blank.txt");
    std::fs::write(&path, "\n").unwrap();

    let provider = FakeAuditor::new();
    let outcome = workflow(provider.clone(), &dir).run(&path).await.unwrap();

    assert_eq!(provider.calls_to(Agent::Orchestrator), 1);
    assert_eq!(outcome.verdicts.len(), 1);
    assert_eq!(outcome.verdicts[0].policy_rule, FALLBACK_CHECK);
    assert_eq!(outcome.verdicts[0].verdict, VerdictCategory::NeedsReview);
    assert!(outcome.report_paths.is_some());
}

#[tokio::test]
async fn test_empty_check_list_uses_fallback_check() {
    let dir = TempDir::new().unwrap();
    let provider = FakeAuditor::with_decomposition(r#"{"checks": ["  "]}"#);
    let outcome = workflow(provider, &dir)
        .run(policy_file(&dir))
        .await
        .unwrap();

    assert_eq!(outcome.verdicts.len(), 1);
    assert_eq!(outcome.verdicts[0].policy_rule, FALLBACK_CHECK);
}

#[tokio::test]
async fn test_failed_verification_is_skipped() {
    let dir = TempDir::new().unwrap();
    let provider = FakeAuditor::failing_verification(MOCK_POLICY_CHECKS[2]);
    let outcome = workflow(provider, &dir)
        .run(policy_file(&dir))
        .await
        .unwrap();

    let rules: Vec<&str> = outcome
        .verdicts
        .iter()
        .map(|v| v.policy_rule.as_str())
        .collect();
    assert_eq!(
        rules,
        vec![MOCK_POLICY_CHECKS[0], MOCK_POLICY_CHECKS[1], MOCK_POLICY_CHECKS[3]]
    );

    let failed = outcome
        .trace
        .entries()
        .iter()
        .find(|e| e.step == "Verification-2")
        .unwrap();
    assert!(failed.metadata["error"].is_string());
    assert!(failed.result.starts_with("Error:"));
}

#[tokio::test]
async fn test_fail_fast_aborts_on_first_failed_call() {
    let dir = TempDir::new().unwrap();
    let provider = FakeAuditor::failing_verification(MOCK_POLICY_CHECKS[1]);
    let workflow = AuditWorkflow::builder(provider.clone())
        .failure_policy(FailurePolicy::FailFast)
        .output(OutputSettings {
            dir: dir.path().join("reports"),
            ..OutputSettings::default()
        })
        .build()
        .unwrap();

    match workflow.run(policy_file(&dir)).await {
        Err(WorkflowError::CallFailed { step, .. }) => assert_eq!(step, "Verification-1"),
        other => panic!("expected CallFailed, got {:?}", other.map(|o| o.summary)),
    }
    assert_eq!(provider.calls_to(Agent::Reporter), 0);
    assert!(!dir.path().join("reports").exists());
}

#[tokio::test]
async fn test_unreadable_policy_makes_no_backend_calls() {
    let dir = TempDir::new().unwrap();
    let provider = FakeAuditor::new();
    let result = workflow(provider.clone(), &dir)
        .run(dir.path().join("missing_policy.txt"))
        .await;

    assert!(matches!(result, Err(WorkflowError::PolicyUnreadable(_))));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_report_round_trip() {
    let dir = TempDir::new().unwrap();
    let outcome = workflow(FakeAuditor::new(), &dir)
        .run(policy_file(&dir))
        .await
        .unwrap();

    let paths = outcome.report_paths.clone().unwrap();
    let report = AuditReport::read_json(&paths.json).unwrap();
    assert_eq!(report.verdicts, outcome.verdicts);
    assert_eq!(report.report_hash, outcome.report_hash);
    assert_eq!(report.trace_log, outcome.trace);
    assert!(report.hash_verified);
    assert!(report.policy_document.ends_with("policy_document.txt"));

    let csv = std::fs::read_to_string(&paths.csv).unwrap();
    assert!(csv.starts_with("Policy Rule,Verdict,Confidence,Document ID,Reasoning\r\n"));
    assert_eq!(csv.lines().count(), 1 + outcome.verdicts.len());
}

#[tokio::test(start_paused = true)]
async fn test_throttled_decomposition_is_retried() {
    let provider = FakeAuditor::throttled(2);
    let workflow = AuditWorkflow::builder(provider.clone())
        .without_export()
        .build()
        .unwrap();

    let dir = TempDir::new().unwrap();
    let outcome = workflow.run(policy_file(&dir)).await.unwrap();

    assert_eq!(provider.calls_to(Agent::Orchestrator), 3);
    assert_eq!(outcome.verdicts.len(), 4);
    assert_eq!(outcome.trace.entries()[0].metadata["attempts"], 3);
    assert!(outcome.report_paths.is_none());
}
