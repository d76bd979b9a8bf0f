//! Top-level entry point: wires the reference-data index, message tree,
//! evaluation tree, criterion planner, scheduler and aggregator together
//! into one evaluation.

use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::aggregator::StatResponse;
use crate::error::{EngineError, Result};
use crate::evaluation_tree::EvaluationTree;
use crate::message_tree::MessageTree;
use crate::reference_data::ReferenceDataIndex;
use crate::rubric;
use crate::sam::SamRegistry;
use crate::scheduler;
use crate::scorecard::{self, Header, PiqiStatResponse};

pub struct Engine {
    reference_data: ReferenceDataIndex,
    registry: SamRegistry,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Loads the reference-data bundle and validates that every SAM the
    /// selected rubric names is registered, before any message is seen.
    pub fn new(reference_data_json: &str, rubric_mnemonic: Option<&str>, registry: SamRegistry) -> Result<Self> {
        let reference_data = ReferenceDataIndex::load(reference_data_json, rubric_mnemonic)?;
        for criterion in &reference_data.rubric.criteria {
            if !registry.contains(&criterion.sam_mnemonic) {
                return Err(EngineError::InvalidReferenceData(format!(
                    "rubric references unregistered SAM {}",
                    criterion.sam_mnemonic
                )));
            }
        }
        Ok(Self { reference_data, registry })
    }

    /// Runs one evaluation of `message_json` against the loaded reference
    /// data, honoring `cancel` for cooperative cancellation.
    pub async fn evaluate(
        &self,
        message_json: &str,
        header: Header,
        cancel: &CancellationToken,
    ) -> Result<PiqiStatResponse> {
        let span = info_span!("evaluate_message", message_id = %header.message_id);
        async move {
            let message = MessageTree::parse(message_json, &self.reference_data.root_entity.mnemonic)?;
            let mut tree = EvaluationTree::build(&self.reference_data, &message);
            rubric::plan(&mut tree, &self.reference_data.rubric)?;

            scheduler::run(&mut tree, &self.reference_data.rubric, &self.registry, cancel).await;

            let stats = collect(&tree, &self.reference_data.rubric);
            let partial = cancel.is_cancelled();
            Ok(scorecard::project(&stats, &self.reference_data.rubric.name, header, partial))
        }
        .instrument(span)
        .await
    }
}

fn collect(tree: &EvaluationTree, rubric: &crate::reference_data::Rubric) -> StatResponse {
    let mut stats = StatResponse::default();
    let criteria_by_key: std::collections::HashMap<_, _> = rubric
        .criteria
        .iter()
        .map(|c| ((c.entity_mnemonic.clone(), c.sam_mnemonic.clone(), c.sequence), c))
        .collect();

    for node_id in tree.post_order() {
        let entity_mnemonic = tree.get(node_id).entity_mnemonic.clone();
        let results: Vec<_> = tree.get(node_id).criteria_results.values().cloned().collect();
        for result in results {
            let key = (entity_mnemonic.clone(), result.criterion.sam_mnemonic.clone(), result.criterion.sequence);
            if let Some(criterion) = criteria_by_key.get(&key) {
                stats.record(tree, node_id, criterion, &result);
            }
        }
    }
    stats
}
