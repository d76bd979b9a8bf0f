use async_trait::async_trait;

use super::Sam;
use crate::evaluation_tree::EvaluationTree;
use crate::types::{NodeId, Parameter, SamResponse};

/// Passes iff none of `item`'s direct children have any failed criterion.
/// Must run after every child's criteria have finalized — the scheduler's
/// post-order traversal guarantees that.
pub struct ElementIsClean;

#[async_trait]
impl Sam for ElementIsClean {
    fn mnemonic(&self) -> &str {
        "element-is-clean"
    }

    async fn evaluate(&self, tree: &EvaluationTree, item: NodeId, _parameters: &[Parameter]) -> SamResponse {
        let node = tree.get(item);
        let failed: usize = node
            .children
            .iter()
            .map(|&child| {
                tree.get(child)
                    .criteria_results
                    .values()
                    .filter(|r| r.state.is_failed())
                    .count()
            })
            .sum();

        if failed == 0 {
            SamResponse::succeeded()
        } else {
            SamResponse::failed(format!("{failed} child criterion failure(s)"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_tree::MessageTree;
    use crate::reference_data::ReferenceDataIndex;

    fn doc() -> &'static str {
        r#"{"ModelLibrary":[{"mnemonic":"MSG","name":"M","fieldName":"m","entityType":"root",
            "children":[{"mnemonic":"PID","name":"P","fieldName":"p","entityType":"class",
            "children":[{"mnemonic":"ELEM","name":"E","fieldName":"e","entityType":"element",
            "children":[{"mnemonic":"ATTR","name":"A","fieldName":"a","entityType":"attribute","children":[]}]}]}]}],
            "EvaluationProfileLibrary":[{"mnemonic":"R","EvaluationCriteria":[]}]}"#
    }

    fn tree_with_one_element() -> EvaluationTree {
        let idx = ReferenceDataIndex::load(doc(), None).unwrap();
        let msg = r#"{"mnemonic":"MSG","children":{"PID":[{"mnemonic":"PID","children":
            {"ELEM":[{"mnemonic":"ELEM","attributes":{"ATTR":"x"}}]}}]}}"#;
        let tree_msg = MessageTree::parse(msg, "MSG").unwrap();
        EvaluationTree::build(&idx, &tree_msg)
    }

    #[tokio::test]
    async fn passes_when_no_child_failures() {
        let tree = tree_with_one_element();
        let class_id = tree.get(tree.root).children[0];
        let element_id = tree.get(class_id).children[0];
        let resp = ElementIsClean.evaluate(&tree, element_id, &[]).await;
        assert_eq!(resp.outcome, crate::types::SamOutcome::Succeeded);
    }

    #[tokio::test]
    async fn fails_when_child_has_failed_criterion() {
        let mut tree = tree_with_one_element();
        let class_id = tree.get(tree.root).children[0];
        let element_id = tree.get(class_id).children[0];
        let attr_id = tree.get(element_id).children[0];
        tree.get_mut(attr_id).criteria_results.insert(
            "some-sam.1".into(),
            crate::types::EvaluationResult {
                id: uuid::Uuid::new_v4(),
                item: attr_id,
                criterion: crate::types::CriterionRef { sam_mnemonic: "some-sam".into(), sequence: 1 },
                is_conditional: false,
                is_dependent: false,
                state: crate::types::EvalState::Failed {
                    cause: crate::types::FailCause::Self_,
                    reason: None,
                },
                eval_performed: true,
                custom_error_message: None,
            },
        );
        let resp = ElementIsClean.evaluate(&tree, element_id, &[]).await;
        assert_eq!(resp.outcome, crate::types::SamOutcome::Failed { fail_reason: Some("1 child criterion failure(s)".into()) });
    }
}
