//! Consumes finalized results and rolls them up into the scalar counters
//! and keyed dictionaries the scorecard is projected from. This is the
//! single writer: the scheduler always folds results in here sequentially
//! on the task that owns the aggregator, so there's no interior mutability
//! here — no mutex, no atomic, just `&mut self`.

use std::collections::HashMap;

use crate::evaluation_tree::EvaluationTree;
use crate::types::{EvalState, EvaluationCriterion, EvaluationResult, FailCause, NodeId, ScoringEffect, SkipCause};

#[derive(Debug, Clone, Default)]
pub struct TrackCounts {
    pub total: u64,
    pub processed: u64,
    pub skipped: u64,
    pub passed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Default)]
pub struct WeightedCounts {
    pub total: u64,
    pub processed: u64,
    pub skipped: u64,
    pub passed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ElementStat {
    pub processed: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub critical_failure_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CauseStat {
    pub count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct InfoStat {
    pub total: u64,
    pub processed: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StatResponse {
    pub scoring: TrackCounts,
    pub weighted: WeightedCounts,
    pub informational: TrackCounts,
    pub critical_failure_count: u64,

    pub element_dict: HashMap<String, ElementStat>,
    pub skip_dict: HashMap<String, CauseStat>,
    pub fail_dict: HashMap<String, CauseStat>,
    pub critical_failure_dict: HashMap<String, CauseStat>,
    pub informational_dict: HashMap<String, InfoStat>,
}

fn skip_cause_name(cause: &SkipCause) -> String {
    match cause {
        SkipCause::Sam(s) => s.clone(),
        SkipCause::Self_ => "self".to_string(),
        SkipCause::Cancelled => "cancelled".to_string(),
    }
}

fn fail_cause_name(cause: &FailCause) -> String {
    match cause {
        FailCause::Sam(s) => s.clone(),
        FailCause::Self_ => "self".to_string(),
        FailCause::Errored { .. } => "error".to_string(),
    }
}

impl StatResponse {
    pub fn record(&mut self, tree: &EvaluationTree, node_id: NodeId, criterion: &EvaluationCriterion, result: &EvaluationResult) {
        if !result.contributes_to_aggregate() {
            return;
        }

        let item = tree.get(node_id);
        let entity = item.entity_mnemonic.clone();
        let sam = criterion.sam_mnemonic.clone();

        match criterion.scoring_effect {
            ScoringEffect::Scoring => self.record_scoring(item, criterion, result, &entity, &sam),
            ScoringEffect::Informational => self.record_informational(criterion, result, &entity, &sam),
        }

        if let (Some(class), Some(seq)) = (&item.class_mnemonic, item.element_sequence) {
            let key = format!("{class}.{seq}");
            let stat = self.element_dict.entry(key).or_default();
            match &result.state {
                EvalState::Passed => {
                    stat.processed += 1;
                    stat.passed += 1;
                }
                EvalState::Failed { .. } => {
                    stat.processed += 1;
                    stat.failed += 1;
                    if criterion.criticality_indicator {
                        stat.critical_failure_count += 1;
                    }
                }
                EvalState::Skipped { .. } => stat.skipped += 1,
                EvalState::Pending => {}
            }
        }
    }

    fn record_scoring(
        &mut self,
        item: &crate::evaluation_tree::EvaluationItem,
        criterion: &EvaluationCriterion,
        result: &EvaluationResult,
        entity: &str,
        sam: &str,
    ) {
        let weight = criterion.scoring_weight as u64;
        self.scoring.total += 1;
        self.weighted.total += weight;

        match &result.state {
            EvalState::Passed => {
                self.scoring.processed += 1;
                self.scoring.passed += 1;
                self.weighted.processed += weight;
                self.weighted.passed += weight;
            }
            EvalState::Failed { cause, .. } => {
                self.scoring.processed += 1;
                self.scoring.failed += 1;
                self.weighted.processed += weight;
                self.weighted.failed += weight;
                let fail_sam = fail_cause_name(cause);
                let key = format!("{entity}|{sam}|{fail_sam}");
                self.fail_dict.entry(key.clone()).or_default().count += 1;
                if criterion.criticality_indicator {
                    self.critical_failure_count += 1;
                    self.critical_failure_dict.entry(key).or_default().count += 1;
                }
            }
            EvalState::Skipped { cause, .. } => {
                self.scoring.skipped += 1;
                self.weighted.skipped += weight;
                let skip_sam = skip_cause_name(cause);
                let key = format!("{entity}|{sam}|{skip_sam}");
                self.skip_dict.entry(key).or_default().count += 1;
            }
            EvalState::Pending => {}
        }
        let _ = item;
    }

    fn record_informational(&mut self, criterion: &EvaluationCriterion, result: &EvaluationResult, entity: &str, sam: &str) {
        self.informational.total += 1;
        let key = format!("{entity}|{sam}");
        let stat = self.informational_dict.entry(key).or_default();
        stat.total += 1;

        match &result.state {
            EvalState::Passed => {
                self.informational.processed += 1;
                self.informational.passed += 1;
                stat.processed += 1;
                stat.passed += 1;
            }
            EvalState::Failed { .. } => {
                self.informational.processed += 1;
                self.informational.failed += 1;
                stat.processed += 1;
                stat.failed += 1;
            }
            EvalState::Skipped { .. } => {
                self.informational.skipped += 1;
                stat.skipped += 1;
            }
            EvalState::Pending => {}
        }
        let _ = criterion;
    }
}
