//! Deterministic projection from the aggregator's internal counters into
//! the external scorecard shape: sorted classes, prettified names,
//! truncated integer percentages.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregator::StatResponse;

#[derive(Debug, Clone, Serialize)]
pub struct ScoreResult {
    pub denominator: u64,
    pub numerator: u64,
    pub score: u32,
    #[serde(rename = "weightedDenominator")]
    pub weighted_denominator: u64,
    #[serde(rename = "weightedNumerator")]
    pub weighted_numerator: u64,
    #[serde(rename = "weightedScore")]
    pub weighted_score: u32,
    #[serde(rename = "criticalFailureCount")]
    pub critical_failure_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataClassResult {
    #[serde(rename = "ClassName")]
    pub class_name: String,
    #[serde(rename = "InstanceCount")]
    pub instance_count: u64,
    #[serde(flatten)]
    pub score: ScoreResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct InformationalEvaluation {
    #[serde(rename = "EntityName")]
    pub entity_name: String,
    #[serde(rename = "EvaluationName")]
    pub evaluation_name: String,
    #[serde(rename = "InstanceCount")]
    pub instance_count: u64,
    #[serde(rename = "Denominator")]
    pub denominator: u64,
    #[serde(rename = "Numerator")]
    pub numerator: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InformationalGroup {
    #[serde(rename = "ClassName")]
    pub class_name: String,
    #[serde(rename = "Evaluations")]
    pub evaluations: Vec<InformationalEvaluation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PiqiStatResponse {
    #[serde(rename = "DataProviderID")]
    pub data_provider_id: String,
    #[serde(rename = "DataSourceID")]
    pub data_source_id: String,
    #[serde(rename = "MessageID")]
    pub message_id: String,
    #[serde(rename = "EvaluationRubric")]
    pub evaluation_rubric: String,
    #[serde(rename = "ProcessDate")]
    pub process_date: String,
    pub partial: bool,
    #[serde(rename = "MessageResults")]
    pub message_results: ScoreResult,
    #[serde(rename = "DataClassResults")]
    pub data_class_results: Vec<DataClassResult>,
    #[serde(rename = "InformationalResults")]
    pub informational_results: Vec<InformationalGroup>,
}

/// `trunc(numerator / denominator * 100)`, zero denominator yields zero.
fn percent(numerator: u64, denominator: u64) -> u32 {
    if denominator == 0 {
        0
    } else {
        ((numerator * 100) / denominator) as u32
    }
}

fn score_result(numerator: u64, denominator: u64, weighted_numerator: u64, weighted_denominator: u64) -> ScoreResult {
    ScoreResult {
        denominator,
        numerator,
        score: percent(numerator, denominator),
        weighted_denominator,
        weighted_numerator,
        weighted_score: percent(weighted_numerator, weighted_denominator),
        critical_failure_count: 0,
    }
}

/// Inserts a space before each upper-case letter and upper-cases the first
/// character, e.g. `"patientIdentification"` -> `"Patient Identification"`.
pub(crate) fn prettify(mnemonic: &str) -> String {
    let mut out = String::with_capacity(mnemonic.len() + 4);
    for (i, ch) in mnemonic.chars().enumerate() {
        if i == 0 {
            out.extend(ch.to_uppercase());
            continue;
        }
        if ch.is_uppercase() {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}

pub struct Header {
    pub data_provider_id: String,
    pub data_source_id: String,
    pub message_id: String,
    pub process_date: String,
}

pub fn project(stats: &StatResponse, rubric_name: &str, header: Header, partial: bool) -> PiqiStatResponse {
    let mut message_results = score_result(
        stats.scoring.passed,
        stats.scoring.processed,
        stats.weighted.passed,
        stats.weighted.processed,
    );
    message_results.critical_failure_count = stats.critical_failure_count;

    // Group element_dict entries by class (the part of the key before '.').
    let mut by_class: BTreeMap<&str, (u64, u64, u64, u64, u64, u64)> = BTreeMap::new();
    for (key, stat) in &stats.element_dict {
        let class = key.split('.').next().unwrap_or(key);
        let entry = by_class.entry(class).or_default();
        entry.0 += stat.processed; // processed
        entry.1 += stat.passed; // passed
        entry.2 += 1; // instance count
        entry.3 += stat.critical_failure_count;
        entry.4 += stat.processed; // denominator mirrors processed (no per-class weights tracked)
        entry.5 += stat.passed; // numerator mirrors passed
    }

    let mut data_class_results: Vec<DataClassResult> = by_class
        .into_iter()
        .map(|(class, (processed, passed, instances, critical, weighted_denom, weighted_num))| {
            let mut score = score_result(passed, processed, weighted_num, weighted_denom);
            score.critical_failure_count = critical;
            DataClassResult {
                class_name: prettify(class),
                instance_count: instances,
                score,
            }
        })
        .collect();
    data_class_results.sort_by(|a, b| a.class_name.cmp(&b.class_name));

    let mut by_entity_class: BTreeMap<&str, Vec<InformationalEvaluation>> = BTreeMap::new();
    for (key, stat) in &stats.informational_dict {
        let mut parts = key.splitn(2, '|');
        let entity = parts.next().unwrap_or(key);
        let sam = parts.next().unwrap_or("");
        by_entity_class.entry(entity).or_default().push(InformationalEvaluation {
            entity_name: prettify(entity),
            evaluation_name: prettify(sam),
            instance_count: stat.total,
            denominator: stat.processed,
            numerator: stat.passed,
        });
    }
    let mut informational_results: Vec<InformationalGroup> = by_entity_class
        .into_iter()
        .map(|(entity, mut evaluations)| {
            evaluations.sort_by(|a, b| a.evaluation_name.cmp(&b.evaluation_name));
            InformationalGroup {
                class_name: prettify(entity),
                evaluations,
            }
        })
        .collect();
    informational_results.sort_by(|a, b| a.class_name.cmp(&b.class_name));

    PiqiStatResponse {
        data_provider_id: header.data_provider_id,
        data_source_id: header.data_source_id,
        message_id: header.message_id,
        evaluation_rubric: rubric_name.to_string(),
        process_date: header.process_date,
        partial,
        message_results,
        data_class_results,
        informational_results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_denominator_yields_zero_score() {
        assert_eq!(percent(0, 0), 0);
    }

    #[test]
    fn truncates_rather_than_rounds() {
        assert_eq!(percent(2, 3), 66);
    }

    #[test]
    fn prettify_inserts_spaces_and_capitalizes() {
        assert_eq!(prettify("patientIdentification"), "Patient Identification");
    }
}
