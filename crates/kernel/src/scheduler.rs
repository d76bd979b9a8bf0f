//! The central state machine: walks the evaluation tree post-order,
//! resolves conditional/dependent ordering, invokes SAMs, and finalizes
//! every result slot. Errors inside one slot never abort the traversal —
//! the same "local failure, keep going" discipline as a tick loop that
//! catches per-event errors and moves on.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::evaluation_tree::EvaluationTree;
use crate::reference_data::Rubric;
use crate::sam::SamRegistry;
use crate::types::{EvalState, EvaluationCriterion, FailCause, NodeId, SamOutcome, SkipCause};

type CriteriaIndex = HashMap<(String, String, u32), EvaluationCriterion>;

/// Walks `tree` in post-order, finalizing every pending result slot.
pub async fn run(tree: &mut EvaluationTree, rubric: &Rubric, registry: &SamRegistry, cancel: &CancellationToken) {
    let index: CriteriaIndex = rubric
        .criteria
        .iter()
        .map(|c| ((c.entity_mnemonic.clone(), c.sam_mnemonic.clone(), c.sequence), c.clone()))
        .collect();

    for node_id in tree.post_order() {
        let entity_mnemonic = tree.get(node_id).entity_mnemonic.clone();
        let span = info_span!("evaluate_item", key = %tree.get(node_id).key);

        if cancel.is_cancelled() {
            cancel_pending(tree, node_id);
            continue;
        }

        let mut slot_keys: Vec<String> = tree.get(node_id).criteria_results.keys().cloned().collect();
        slot_keys.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

        async {
            for slot_key in slot_keys {
                finalize_slot(tree, entity_mnemonic.clone(), node_id, slot_key, &index, registry, cancel).await;
            }
        }
        .instrument(span)
        .await;
    }
}

/// Parses `"{sam}.{sequence}"` into a sortable `(sam, sequence)` tuple.
fn sort_key(slot_key: &str) -> (String, u32) {
    match slot_key.rsplit_once('.') {
        Some((sam, seq)) => (sam.to_string(), seq.parse().unwrap_or(0)),
        None => (slot_key.to_string(), 0),
    }
}

fn cancel_pending(tree: &mut EvaluationTree, node_id: NodeId) {
    let item = tree.get_mut(node_id);
    let mut finalized = Vec::new();
    for (slot_key, result) in item.criteria_results.iter_mut() {
        if result.state.is_pending() {
            result.state = EvalState::Skipped {
                cause: SkipCause::Cancelled,
                reason: Some("cancelled".to_string()),
            };
            result.eval_performed = false;
            finalized.push((slot_key.clone(), result.clone()));
        }
    }
    for (slot_key, result) in finalized {
        if result.belongs_in_full_results() {
            item.full_results.insert(slot_key, result);
        } else {
            item.full_results.remove(&slot_key);
        }
    }
}

fn finalize_slot<'a>(
    tree: &'a mut EvaluationTree,
    entity_mnemonic: String,
    node_id: NodeId,
    slot_key: String,
    index: &'a CriteriaIndex,
    registry: &'a SamRegistry,
    cancel: &'a CancellationToken,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let already_done = tree
            .get(node_id)
            .criteria_results
            .get(&slot_key)
            .map(|r| !r.state.is_pending())
            .unwrap_or(true);
        if already_done {
            return;
        }

        let (sam_mnemonic, sequence) = sort_key(&slot_key);
        let Some(criterion) = index.get(&(entity_mnemonic.clone(), sam_mnemonic.clone(), sequence)).cloned() else {
            finalize(tree, node_id, &slot_key, EvalState::Failed {
                cause: FailCause::Errored { message: format!("no criterion definition for {slot_key}") },
                reason: None,
            }, false, None);
            return;
        };

        if let Some(cond) = criterion.conditional_on.clone() {
            let cond_key = format!("{}.{}", cond.sam_mnemonic, cond.sequence);
            finalize_slot(tree, entity_mnemonic.clone(), node_id, cond_key.clone(), index, registry, cancel).await;
            let cond_state = tree.get(node_id).criteria_results.get(&cond_key).map(|r| r.state.clone());
            let passed = matches!(cond_state, Some(EvalState::Passed));
            if !passed {
                finalize(
                    tree,
                    node_id,
                    &slot_key,
                    EvalState::Skipped {
                        cause: SkipCause::Sam(cond.sam_mnemonic.clone()),
                        reason: Some("conditional not met".to_string()),
                    },
                    false,
                    None,
                );
                return;
            }
        }

        if let Some(dep) = criterion.dependent_on.clone() {
            let dep_key = format!("{}.{}", dep.sam_mnemonic, dep.sequence);
            finalize_slot(tree, entity_mnemonic.clone(), node_id, dep_key.clone(), index, registry, cancel).await;
            let dep_state = tree.get(node_id).criteria_results.get(&dep_key).map(|r| r.state.clone());
            match dep_state {
                Some(EvalState::Skipped { .. }) => {
                    finalize(
                        tree,
                        node_id,
                        &slot_key,
                        EvalState::Skipped {
                            cause: SkipCause::Sam(dep.sam_mnemonic.clone()),
                            reason: Some("dependent SAM skipped".to_string()),
                        },
                        false,
                        None,
                    );
                    return;
                }
                Some(EvalState::Failed { .. }) => {
                    finalize(
                        tree,
                        node_id,
                        &slot_key,
                        EvalState::Failed {
                            cause: FailCause::Sam(dep.sam_mnemonic.clone()),
                            reason: Some("dependent SAM failed".to_string()),
                        },
                        false,
                        None,
                    );
                    return;
                }
                _ => {}
            }
        }

        if cancel.is_cancelled() {
            finalize(
                tree,
                node_id,
                &slot_key,
                EvalState::Skipped { cause: SkipCause::Cancelled, reason: Some("cancelled".to_string()) },
                false,
                None,
            );
            return;
        }

        let Some(sam) = registry.get(&sam_mnemonic) else {
            finalize(
                tree,
                node_id,
                &slot_key,
                EvalState::Failed {
                    cause: FailCause::Errored { message: format!("unknown SAM {sam_mnemonic}") },
                    reason: None,
                },
                true,
                None,
            );
            return;
        };

        let response = sam.evaluate(tree, node_id, &criterion.parameters).await;
        debug!(sam = %sam_mnemonic, outcome = ?response.outcome, "sam evaluated");

        let (state, custom_error) = match response.outcome {
            SamOutcome::Succeeded => (EvalState::Passed, None),
            SamOutcome::Failed { fail_reason } => {
                (EvalState::Failed { cause: FailCause::Self_, reason: fail_reason }, None)
            }
            SamOutcome::Skipped { skip_reason } => {
                (EvalState::Skipped { cause: SkipCause::Self_, reason: skip_reason }, None)
            }
            SamOutcome::Errored { error_message } => (
                EvalState::Failed {
                    cause: FailCause::Errored { message: error_message.clone() },
                    reason: None,
                },
                Some(error_message),
            ),
        };
        finalize(tree, node_id, &slot_key, state, true, custom_error);
    })
}

fn finalize(
    tree: &mut EvaluationTree,
    node_id: NodeId,
    slot_key: &str,
    state: EvalState,
    eval_performed: bool,
    custom_error_message: Option<String>,
) {
    let item = tree.get_mut(node_id);
    let Some(result) = item.criteria_results.get_mut(slot_key) else {
        return;
    };
    result.state = state;
    result.eval_performed = eval_performed;
    result.custom_error_message = custom_error_message;

    let finalized = result.clone();
    if finalized.belongs_in_full_results() {
        item.full_results.insert(slot_key.to_string(), finalized);
    } else {
        item.full_results.remove(slot_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_tree::MessageTree;
    use crate::reference_data::ReferenceDataIndex;
    use crate::rubric::plan;
    use crate::sam::SamRegistry;
    use crate::types::{CriterionRef, ScoringEffect};

    fn doc() -> &'static str {
        r#"{"ModelLibrary":[{"mnemonic":"MSG","name":"M","fieldName":"m","entityType":"root",
            "children":[{"mnemonic":"PID","name":"P","fieldName":"p","entityType":"class","children":[]}]}],
            "EvaluationProfileLibrary":[{"mnemonic":"R","EvaluationCriteria":[]}]}"#
    }

    fn build_tree() -> EvaluationTree {
        let idx = ReferenceDataIndex::load(doc(), None).unwrap();
        let msg = MessageTree::parse(r#"{"mnemonic":"MSG","children":{"PID":[{"mnemonic":"PID"}]}}"#, "MSG").unwrap();
        EvaluationTree::build(&idx, &msg)
    }

    #[tokio::test]
    async fn conditional_skip_propagates() {
        let mut tree = build_tree();
        let rubric = Rubric {
            mnemonic: "R".into(),
            name: "R".into(),
            criteria: vec![
                crate::types::EvaluationCriterion {
                    entity_mnemonic: "PID".into(),
                    sequence: 1,
                    sam_mnemonic: "element-is-clean".into(),
                    scoring_effect: ScoringEffect::Scoring,
                    scoring_weight: 1,
                    criticality_indicator: false,
                    sam_name_override: None,
                    parameters: vec![],
                    conditional_on: None,
                    dependent_on: None,
                },
            ],
        };
        plan(&mut tree, &rubric).unwrap();
        let registry = SamRegistry::new();
        let cancel = CancellationToken::new();
        run(&mut tree, &rubric, &registry, &cancel).await;
        let class_id = tree.get(tree.root).children[0];
        let result = tree.get(class_id).criteria_results.get("element-is-clean.1").unwrap();
        assert_eq!(result.state, EvalState::Passed);
    }

    #[tokio::test]
    async fn unconditional_and_dependent_chain() {
        let mut tree = build_tree();
        let base = crate::types::EvaluationCriterion {
            entity_mnemonic: "PID".into(),
            sequence: 1,
            sam_mnemonic: "always-fail".into(),
            scoring_effect: ScoringEffect::Scoring,
            scoring_weight: 1,
            criticality_indicator: false,
            sam_name_override: None,
            parameters: vec![],
            conditional_on: None,
            dependent_on: None,
        };
        let dependent = crate::types::EvaluationCriterion {
            entity_mnemonic: "PID".into(),
            sequence: 1,
            sam_mnemonic: "element-is-clean".into(),
            scoring_effect: ScoringEffect::Scoring,
            scoring_weight: 1,
            criticality_indicator: false,
            sam_name_override: None,
            parameters: vec![],
            conditional_on: None,
            dependent_on: Some(CriterionRef { sam_mnemonic: "always-fail".into(), sequence: 1 }),
        };
        let rubric = Rubric { mnemonic: "R".into(), name: "R".into(), criteria: vec![base, dependent] };
        plan(&mut tree, &rubric).unwrap();

        let mut registry = SamRegistry::new();
        registry.register(std::sync::Arc::new(AlwaysFail));
        let cancel = CancellationToken::new();
        run(&mut tree, &rubric, &registry, &cancel).await;

        let class_id = tree.get(tree.root).children[0];
        let dep_result = tree.get(class_id).criteria_results.get("element-is-clean.1").unwrap();
        assert!(dep_result.state.is_failed());
    }

    struct AlwaysFail;
    #[async_trait::async_trait]
    impl crate::sam::Sam for AlwaysFail {
        fn mnemonic(&self) -> &str {
            "always-fail"
        }
        async fn evaluate(
            &self,
            _tree: &EvaluationTree,
            _item: NodeId,
            _parameters: &[crate::types::Parameter],
        ) -> crate::types::SamResponse {
            crate::types::SamResponse::failed("always fails")
        }
    }
}
