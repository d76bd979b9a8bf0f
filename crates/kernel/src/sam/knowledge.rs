use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use piqi_terminology::{KnowledgeClient, LabDeviceQuery, LabResultQuery, Plausibility};

use super::Sam;
use crate::evaluation_tree::EvaluationTree;
use crate::types::{NodeId, Parameter, SamResponse};

const TIMEOUT_REASON: &str = "collaborator call timed out";

fn field(value: &serde_json::Value, name: &str) -> String {
    value.get(name).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

/// Checks whether a lab result value is plausible given the patient's date
/// of birth and the test's reference context. `UNKNOWN` is a skip, not a
/// pass or fail.
pub struct LabResultPlausibility {
    knowledge: Arc<dyn KnowledgeClient>,
    timeout: Duration,
}

impl LabResultPlausibility {
    pub fn new(knowledge: Arc<dyn KnowledgeClient>, timeout: Duration) -> Self {
        Self { knowledge, timeout }
    }
}

#[async_trait]
impl Sam for LabResultPlausibility {
    fn mnemonic(&self) -> &str {
        "lab-result-plausibility"
    }

    async fn evaluate(&self, tree: &EvaluationTree, item: NodeId, _parameters: &[Parameter]) -> SamResponse {
        let text = &tree.get(item).message_text;
        let query = LabResultQuery {
            date_of_birth: field(text, "dateOfBirth"),
            test_code: field(text, "testCode"),
            result_value: field(text, "resultValue"),
            stamp: field(text, "stamp"),
            lang: field(text, "lang"),
            nav: field(text, "nav"),
        };
        match tokio::time::timeout(self.timeout, self.knowledge.lab_result_plausibility(&query)).await {
            Ok(Ok(Plausibility::Plausible)) => SamResponse::succeeded(),
            Ok(Ok(Plausibility::Implausible)) => {
                SamResponse::failed(format!("lab result {} implausible for patient", query.test_code))
            }
            Ok(Ok(Plausibility::Unknown)) => SamResponse::skipped("plausibility unknown"),
            Ok(Err(e)) => SamResponse::errored(e.to_string()),
            Err(_) => SamResponse::errored(TIMEOUT_REASON),
        }
    }
}

/// Checks whether a lab device's reference range is plausible.
pub struct LabDevicePlausibility {
    knowledge: Arc<dyn KnowledgeClient>,
    timeout: Duration,
}

impl LabDevicePlausibility {
    pub fn new(knowledge: Arc<dyn KnowledgeClient>, timeout: Duration) -> Self {
        Self { knowledge, timeout }
    }
}

#[async_trait]
impl Sam for LabDevicePlausibility {
    fn mnemonic(&self) -> &str {
        "lab-device-plausibility"
    }

    async fn evaluate(&self, tree: &EvaluationTree, item: NodeId, _parameters: &[Parameter]) -> SamResponse {
        let text = &tree.get(item).message_text;
        let query = LabDeviceQuery {
            test_code: field(text, "testCode"),
            ref_range_low: field(text, "refRangeLow"),
            ref_range_high: field(text, "refRangeHigh"),
            unit: field(text, "unit"),
            stamp: field(text, "stamp"),
            lang: field(text, "lang"),
            nav: field(text, "nav"),
        };
        match tokio::time::timeout(self.timeout, self.knowledge.lab_device_plausibility(&query)).await {
            Ok(Ok(Plausibility::Plausible)) => SamResponse::succeeded(),
            Ok(Ok(Plausibility::Implausible)) => {
                SamResponse::failed(format!("lab device range implausible for {}", query.test_code))
            }
            Ok(Ok(Plausibility::Unknown)) => SamResponse::skipped("plausibility unknown"),
            Ok(Err(e)) => SamResponse::errored(e.to_string()),
            Err(_) => SamResponse::errored(TIMEOUT_REASON),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_tree::MessageTree;
    use crate::reference_data::ReferenceDataIndex;
    use piqi_terminology::MockKnowledgeClient;

    fn doc() -> &'static str {
        r#"{"ModelLibrary":[{"mnemonic":"MSG","name":"M","fieldName":"m","entityType":"root",
            "children":[{"mnemonic":"LAB","name":"L","fieldName":"l","entityType":"class",
            "children":[{"mnemonic":"RESULT","name":"R","fieldName":"r","entityType":"element","children":[]}]}]}],
            "EvaluationProfileLibrary":[{"mnemonic":"R","EvaluationCriteria":[]}]}"#
    }

    #[tokio::test]
    async fn unknown_plausibility_skips() {
        let idx = ReferenceDataIndex::load(doc(), None).unwrap();
        let msg = r#"{"mnemonic":"MSG","children":{"LAB":[{"mnemonic":"LAB","children":
            {"RESULT":[{"mnemonic":"RESULT","raw":{"testCode":"GLU","resultValue":"90"}}]}}]}}"#;
        let tree_msg = MessageTree::parse(msg, "MSG").unwrap();
        let tree = EvaluationTree::build(&idx, &tree_msg);
        let class_id = tree.get(tree.root).children[0];
        let element_id = tree.get(class_id).children[0];

        let knowledge = Arc::new(MockKnowledgeClient::new());
        let sam = LabResultPlausibility::new(knowledge, Duration::from_secs(5));
        let resp = sam.evaluate(&tree, element_id, &[]).await;
        assert_eq!(resp.outcome, crate::types::SamOutcome::Skipped { skip_reason: Some("plausibility unknown".into()) });
    }
}
