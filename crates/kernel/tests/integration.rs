//! End-to-end evaluations against the full pipeline: reference data, a
//! message, a rubric, and the registered SAMs, with no mocking of the
//! engine's own stages.

use std::sync::Arc;
use std::time::Duration;

use piqi_kernel::sam::{Sam, SamRegistry};
use piqi_kernel::types::{NodeId, Parameter, SamResponse};
use piqi_kernel::{Engine, Header};
use piqi_terminology::{CodingRef, LookupOutcome, MockFhirClient, MockKnowledgeClient};
use tokio_util::sync::CancellationToken;

fn header() -> Header {
    Header {
        data_provider_id: "DP1".into(),
        data_source_id: "DS1".into(),
        message_id: "M1".into(),
        process_date: "2026-08-01T00:00:00Z".into(),
    }
}

fn reference_data() -> &'static str {
    r#"{
        "ModelLibrary": [{
            "mnemonic": "MSG", "name": "Message", "fieldName": "msg", "entityType": "root",
            "children": [{
                "mnemonic": "PID", "name": "Patient Identification", "fieldName": "pid", "entityType": "class",
                "children": [{
                    "mnemonic": "PIDELEM", "name": "Pid Element", "fieldName": "pidElem", "entityType": "element",
                    "children": [{
                        "mnemonic": "CODE", "name": "Code", "fieldName": "code", "entityType": "attribute", "children": []
                    }]
                }]
            }]
        }],
        "EvaluationProfileLibrary": [{
            "mnemonic": "RUB1",
            "name": "Sample Rubric",
            "EvaluationCriteria": [{
                "entityMnemonic": "CODE",
                "samMnemonic": "code-system-interoperability",
                "sequence": 1,
                "scoringEffect": "Scoring",
                "scoringWeight": 2,
                "criticalityIndicator": true
            }]
        }]
    }"#
}

fn message(code_value: &str) -> String {
    format!(
        r#"{{
            "mnemonic": "MSG",
            "children": {{
                "PID": [{{
                    "mnemonic": "PID",
                    "children": {{
                        "PIDELEM": [{{"mnemonic": "PIDELEM", "attributes": {{"CODE": "{code_value}"}}}}]
                    }}
                }}]
            }}
        }}"#
    )
}

/// A failure on a child attribute is recorded under its own criterion and
/// separately propagates into the parent element's cleanliness check — both
/// results land in the scorecard rather than one masking the other.
#[tokio::test]
async fn child_failure_is_tallied_and_fails_parent_cleanliness() {
    let doc = r#"{
        "ModelLibrary": [{
            "mnemonic": "MSG", "name": "Message", "fieldName": "msg", "entityType": "root",
            "children": [{
                "mnemonic": "PID", "name": "Patient Identification", "fieldName": "pid", "entityType": "class",
                "children": [{
                    "mnemonic": "PIDELEM", "name": "Pid Element", "fieldName": "pidElem", "entityType": "element",
                    "children": [{
                        "mnemonic": "CODE", "name": "Code", "fieldName": "code", "entityType": "attribute", "children": []
                    }]
                }]
            }]
        }],
        "EvaluationProfileLibrary": [{
            "mnemonic": "RUB1",
            "name": "Sample Rubric",
            "EvaluationCriteria": [
                {"entityMnemonic": "PIDELEM", "samMnemonic": "element-is-clean", "sequence": 1, "scoringEffect": "Scoring", "scoringWeight": 1, "criticalityIndicator": false},
                {"entityMnemonic": "CODE", "samMnemonic": "code-system-interoperability", "sequence": 1, "scoringEffect": "Scoring", "scoringWeight": 2, "criticalityIndicator": true}
            ]
        }]
    }"#;

    let fhir = Arc::new(MockFhirClient::new());
    fhir.script_lookup(
        &CodingRef { system: "http://loinc.org".into(), code: "BAD".into() },
        Ok(LookupOutcome::NotFound),
    );
    let knowledge = Arc::new(MockKnowledgeClient::new());
    let registry = SamRegistry::with_collaborators(fhir, knowledge, Duration::from_secs(5));
    let engine = Engine::new(doc, None, registry).unwrap();

    let cancel = CancellationToken::new();
    let scorecard = engine
        .evaluate(&message("http://loinc.org|BAD"), header(), &cancel)
        .await
        .unwrap();

    // Two distinct criteria fire: the attribute's own lookup, and the
    // element's cleanliness check that sees the attribute's failure.
    assert_eq!(scorecard.message_results.denominator, 2);
    assert_eq!(scorecard.message_results.numerator, 0);
    assert_eq!(scorecard.data_class_results.len(), 1);
    assert_eq!(scorecard.data_class_results[0].score.critical_failure_count, 1);
}

/// `dependentOn` gates a second criterion on the same item: when the gate
/// fails, the gated criterion is skipped rather than evaluated, but both
/// still land in the scorecard as distinct, separately-counted results.
#[tokio::test]
async fn dependent_criterion_skips_when_gate_fails() {
    let doc = r#"{
        "ModelLibrary": [{
            "mnemonic": "MSG", "name": "Message", "fieldName": "msg", "entityType": "root",
            "children": [{"mnemonic": "PID", "name": "Patient", "fieldName": "pid", "entityType": "class", "children": []}]
        }],
        "EvaluationProfileLibrary": [{
            "mnemonic": "RUB1",
            "name": "Gate Rubric",
            "EvaluationCriteria": [
                {"entityMnemonic": "PID", "samMnemonic": "always-fail", "sequence": 1, "scoringEffect": "Scoring", "scoringWeight": 1, "criticalityIndicator": false},
                {"entityMnemonic": "PID", "samMnemonic": "always-pass", "sequence": 1, "scoringEffect": "Scoring", "scoringWeight": 3, "criticalityIndicator": false, "dependentOn": {"samMnemonic": "always-fail", "sequence": 1}}
            ]
        }]
    }"#;
    let msg = r#"{"mnemonic": "MSG", "children": {"PID": [{"mnemonic": "PID"}]}}"#;

    let mut registry = SamRegistry::new();
    registry.register(Arc::new(Fixed { name: "always-fail", outcome: Outcome::Fail }));
    registry.register(Arc::new(Fixed { name: "always-pass", outcome: Outcome::Pass }));
    let engine = Engine::new(doc, None, registry).unwrap();

    let cancel = CancellationToken::new();
    let scorecard = engine.evaluate(msg, header(), &cancel).await.unwrap();

    assert_eq!(scorecard.message_results.denominator, 1); // only the gate itself processed
    assert_eq!(scorecard.message_results.numerator, 0);
    assert_eq!(scorecard.message_results.weighted_denominator, 1); // the skipped criterion's weight-3 is excluded from processed
}

/// A non-coded attribute value (no `system|code`) always passes terminology
/// checks, since there's nothing to validate against a code system.
#[tokio::test]
async fn non_coded_attribute_passes_terminology_check() {
    let fhir = Arc::new(MockFhirClient::new());
    let knowledge = Arc::new(MockKnowledgeClient::new());
    let registry = SamRegistry::with_collaborators(fhir, knowledge, Duration::from_secs(5));
    let engine = Engine::new(reference_data(), None, registry).unwrap();

    let cancel = CancellationToken::new();
    let scorecard = engine.evaluate(&message("plain-text"), header(), &cancel).await.unwrap();

    assert_eq!(scorecard.message_results.numerator, scorecard.message_results.denominator);
    assert_eq!(scorecard.message_results.denominator, 1);
}

/// Cancelling before the scheduler runs skips every slot and the scorecard
/// comes back marked partial.
#[tokio::test]
async fn cancellation_before_run_marks_partial() {
    let fhir = Arc::new(MockFhirClient::new());
    let knowledge = Arc::new(MockKnowledgeClient::new());
    let registry = SamRegistry::with_collaborators(fhir, knowledge, Duration::from_secs(5));
    let engine = Engine::new(reference_data(), None, registry).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let scorecard = engine.evaluate(&message("plain-text"), header(), &cancel).await.unwrap();

    assert!(scorecard.partial);
    assert_eq!(scorecard.message_results.numerator, 0);
}

/// Unknown lab plausibility skips rather than fails or passes the criterion,
/// so it never reaches the processed (pass/fail) denominator.
#[tokio::test]
async fn unknown_lab_plausibility_skips() {
    let doc = r#"{
        "ModelLibrary": [{
            "mnemonic": "MSG", "name": "Message", "fieldName": "msg", "entityType": "root",
            "children": [{
                "mnemonic": "LAB", "name": "Lab", "fieldName": "lab", "entityType": "class",
                "children": [{
                    "mnemonic": "LABELEM", "name": "Lab Element", "fieldName": "labElem", "entityType": "element",
                    "children": []
                }]
            }]
        }],
        "EvaluationProfileLibrary": [{
            "mnemonic": "RUB1",
            "name": "Lab Rubric",
            "EvaluationCriteria": [{
                "entityMnemonic": "LABELEM",
                "samMnemonic": "lab-result-plausibility",
                "sequence": 1,
                "scoringEffect": "Scoring",
                "scoringWeight": 1,
                "criticalityIndicator": false
            }]
        }]
    }"#;
    let msg = r#"{
        "mnemonic": "MSG",
        "children": {
            "LAB": [{
                "mnemonic": "LAB",
                "children": {
                    "LABELEM": [{"mnemonic": "LABELEM", "raw": {"dateOfBirth": "1990-01-01", "testCode": "GLU", "resultValue": "90", "stamp": "now", "lang": "en", "nav": "na"}}]
                }
            }]
        }
    }"#;

    let fhir = Arc::new(MockFhirClient::new());
    let knowledge = Arc::new(MockKnowledgeClient::new());
    let registry = SamRegistry::with_collaborators(fhir, knowledge, Duration::from_secs(5));
    let engine = Engine::new(doc, None, registry).unwrap();

    let cancel = CancellationToken::new();
    let scorecard = engine.evaluate(msg, header(), &cancel).await.unwrap();

    assert_eq!(scorecard.message_results.denominator, 0);
}

/// A rubric whose conditional/dependent graph cycles is rejected once a
/// message is evaluated (planning runs against the built evaluation tree).
#[tokio::test]
async fn cyclic_rubric_is_rejected() {
    let doc = r#"{
        "ModelLibrary": [{
            "mnemonic": "MSG", "name": "Message", "fieldName": "msg", "entityType": "root",
            "children": [{"mnemonic": "PID", "name": "Patient", "fieldName": "pid", "entityType": "class", "children": []}]
        }],
        "EvaluationProfileLibrary": [{
            "mnemonic": "RUB1",
            "name": "Cyclic Rubric",
            "EvaluationCriteria": [
                {"entityMnemonic": "PID", "samMnemonic": "A", "sequence": 1, "scoringEffect": "Scoring", "scoringWeight": 1, "criticalityIndicator": false, "dependentOn": {"samMnemonic": "B", "sequence": 1}},
                {"entityMnemonic": "PID", "samMnemonic": "B", "sequence": 1, "scoringEffect": "Scoring", "scoringWeight": 1, "criticalityIndicator": false, "dependentOn": {"samMnemonic": "A", "sequence": 1}}
            ]
        }]
    }"#;
    let mut registry = SamRegistry::new();
    registry.register(Arc::new(Fixed { name: "A", outcome: Outcome::Pass }));
    registry.register(Arc::new(Fixed { name: "B", outcome: Outcome::Pass }));
    let engine = Engine::new(doc, None, registry).unwrap();

    let msg = r#"{"mnemonic": "MSG", "children": {"PID": [{"mnemonic": "PID"}]}}"#;
    let cancel = CancellationToken::new();
    let result = engine.evaluate(msg, header(), &cancel).await;
    assert!(result.is_err());
}

enum Outcome {
    Pass,
    Fail,
}

struct Fixed {
    name: &'static str,
    outcome: Outcome,
}

#[async_trait::async_trait]
impl Sam for Fixed {
    fn mnemonic(&self) -> &str {
        self.name
    }

    async fn evaluate(&self, _tree: &piqi_kernel::evaluation_tree::EvaluationTree, _item: NodeId, _parameters: &[Parameter]) -> SamResponse {
        match self.outcome {
            Outcome::Pass => SamResponse::succeeded(),
            Outcome::Fail => SamResponse::failed("fixed failure"),
        }
    }
}
