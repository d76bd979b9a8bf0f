//! The frozen lookup over model, rubric, code system and value set
//! documents. Built once per evaluation request and never mutated again.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{EngineError, Result};
use crate::types::{CriterionRef, Entity, EvaluationCriterion, Parameter, ScoringEffect};

#[derive(Debug, Deserialize)]
struct ReferenceDataDocument {
    #[serde(rename = "ModelLibrary")]
    model_library: Vec<Entity>,
    #[serde(rename = "EvaluationProfileLibrary")]
    evaluation_profile_library: Vec<RubricDocument>,
    #[serde(rename = "CodeSystemLibrary", default)]
    code_system_library: Vec<CodeSystemDocument>,
    #[serde(rename = "ValueSetLibrary", default)]
    value_set_library: Vec<ValueSetDocument>,
}

#[derive(Debug, Deserialize)]
struct RubricDocument {
    mnemonic: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "EvaluationCriteria")]
    criteria: Vec<CriterionDocument>,
}

#[derive(Debug, Deserialize)]
struct CriterionDocument {
    #[serde(rename = "entityMnemonic")]
    entity_mnemonic: String,
    #[serde(rename = "samMnemonic")]
    sam_mnemonic: String,
    sequence: u32,
    #[serde(rename = "scoringEffect")]
    scoring_effect: String,
    #[serde(rename = "scoringWeight", default)]
    scoring_weight: u32,
    #[serde(rename = "criticalityIndicator", default)]
    criticality_indicator: bool,
    #[serde(rename = "samNameOverride", default)]
    sam_name_override: Option<String>,
    #[serde(default)]
    parameters: Vec<Parameter>,
    #[serde(rename = "conditionalOn", default)]
    conditional_on: Option<CriterionRefDocument>,
    #[serde(rename = "dependentOn", default)]
    dependent_on: Option<CriterionRefDocument>,
}

#[derive(Debug, Deserialize)]
struct CriterionRefDocument {
    #[serde(rename = "samMnemonic")]
    sam_mnemonic: String,
    sequence: u32,
}

impl From<CriterionRefDocument> for CriterionRef {
    fn from(doc: CriterionRefDocument) -> Self {
        CriterionRef {
            sam_mnemonic: doc.sam_mnemonic,
            sequence: doc.sequence,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CodeSystemDocument {
    pub mnemonic: String,
    pub uri: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValueSetDocument {
    pub mnemonic: String,
}

#[derive(Debug, Clone)]
pub struct Rubric {
    pub mnemonic: String,
    pub name: String,
    pub criteria: Vec<EvaluationCriterion>,
}

/// Display metadata for a SAM. The reference-data bundle carries no
/// separate SAM library, so a descriptor is derived from how the rubric
/// names the mnemonic: `samNameOverride` if any criterion sets one,
/// otherwise the prettified mnemonic.
#[derive(Debug, Clone)]
pub struct SamDescriptor {
    pub mnemonic: String,
    pub display_name: String,
}

fn build_sam_descriptors(criteria: &[EvaluationCriterion]) -> HashMap<String, SamDescriptor> {
    let mut descriptors = HashMap::new();
    for criterion in criteria {
        let display_name = criterion
            .sam_name_override
            .clone()
            .unwrap_or_else(|| crate::scorecard::prettify(&criterion.sam_mnemonic));
        let entry = descriptors.entry(criterion.sam_mnemonic.clone()).or_insert_with(|| SamDescriptor {
            mnemonic: criterion.sam_mnemonic.clone(),
            display_name: display_name.clone(),
        });
        if criterion.sam_name_override.is_some() {
            entry.display_name = display_name;
        }
    }
    descriptors
}

/// The frozen reference-data index: the entity model, the selected rubric,
/// and code system / value set descriptors, all keyed by mnemonic.
#[derive(Debug)]
pub struct ReferenceDataIndex {
    pub root_entity: Entity,
    entities_by_mnemonic: HashMap<String, Entity>,
    code_systems: HashMap<String, CodeSystemDocument>,
    value_sets: HashMap<String, ValueSetDocument>,
    sam_descriptors: HashMap<String, SamDescriptor>,
    pub rubric: Rubric,
}

impl ReferenceDataIndex {
    /// Parses the reference-data bundle and selects the rubric named
    /// `rubric_mnemonic` (or the sole rubric, if the document carries only
    /// one and none was requested).
    pub fn load(raw: &str, rubric_mnemonic: Option<&str>) -> Result<Self> {
        let doc: ReferenceDataDocument = serde_json::from_str(raw)
            .map_err(|e| EngineError::InvalidReferenceData(format!("malformed document: {e}")))?;

        let root_entity = doc
            .model_library
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::InvalidReferenceData("empty ModelLibrary".into()))?;

        let mut entities_by_mnemonic = HashMap::new();
        flatten_entity(&root_entity, &mut entities_by_mnemonic);

        let rubric_doc = match rubric_mnemonic {
            Some(wanted) => doc
                .evaluation_profile_library
                .into_iter()
                .find(|r| r.mnemonic == wanted)
                .ok_or_else(|| {
                    EngineError::InvalidReferenceData(format!("no rubric named {wanted}"))
                })?,
            None => {
                let mut it = doc.evaluation_profile_library.into_iter();
                let first = it
                    .next()
                    .ok_or_else(|| EngineError::InvalidReferenceData("empty EvaluationProfileLibrary".into()))?;
                if it.next().is_some() {
                    return Err(EngineError::InvalidReferenceData(
                        "multiple rubrics present; a rubric mnemonic must be specified".into(),
                    ));
                }
                first
            }
        };

        let mut criteria = Vec::with_capacity(rubric_doc.criteria.len());
        for c in rubric_doc.criteria {
            if !entities_by_mnemonic.contains_key(&c.entity_mnemonic) {
                return Err(EngineError::InvalidReferenceData(format!(
                    "criterion references unknown entity mnemonic {}",
                    c.entity_mnemonic
                )));
            }
            let scoring_effect = match c.scoring_effect.as_str() {
                "Scoring" => ScoringEffect::Scoring,
                "Informational" => ScoringEffect::Informational,
                other => {
                    return Err(EngineError::InvalidReferenceData(format!(
                        "unknown scoringEffect {other}"
                    )));
                }
            };
            criteria.push(EvaluationCriterion {
                entity_mnemonic: c.entity_mnemonic,
                sequence: c.sequence,
                sam_mnemonic: c.sam_mnemonic,
                scoring_effect,
                scoring_weight: c.scoring_weight,
                criticality_indicator: c.criticality_indicator,
                sam_name_override: c.sam_name_override,
                parameters: c.parameters,
                conditional_on: c.conditional_on.map(Into::into),
                dependent_on: c.dependent_on.map(Into::into),
            });
        }

        let rubric_name = rubric_doc.name.unwrap_or_else(|| rubric_doc.mnemonic.clone());
        let rubric = Rubric {
            mnemonic: rubric_doc.mnemonic,
            name: rubric_name,
            criteria,
        };

        let code_systems = doc
            .code_system_library
            .into_iter()
            .flat_map(|cs| [(cs.mnemonic.clone(), cs.clone()), (cs.uri.clone(), cs)])
            .collect();
        let value_sets = doc
            .value_set_library
            .into_iter()
            .map(|vs| (vs.mnemonic.clone(), vs))
            .collect();
        let sam_descriptors = build_sam_descriptors(&rubric.criteria);

        Ok(Self {
            root_entity,
            entities_by_mnemonic,
            code_systems,
            value_sets,
            sam_descriptors,
            rubric,
        })
    }

    pub fn get_entity(&self, mnemonic: &str) -> Option<&Entity> {
        self.entities_by_mnemonic.get(mnemonic)
    }

    /// Accepts either a mnemonic or a canonical URI, returning the same
    /// identity for both.
    pub fn get_code_system(&self, mnemonic_or_uri: &str) -> Option<&CodeSystemDocument> {
        self.code_systems.get(mnemonic_or_uri)
    }

    pub fn get_value_set(&self, mnemonic: &str) -> Option<&ValueSetDocument> {
        self.value_sets.get(mnemonic)
    }

    pub fn get_sam_descriptor(&self, mnemonic: &str) -> Option<&SamDescriptor> {
        self.sam_descriptors.get(mnemonic)
    }
}

fn flatten_entity(entity: &Entity, out: &mut HashMap<String, Entity>) {
    out.insert(entity.mnemonic.clone(), entity.clone());
    for child in &entity.children {
        flatten_entity(child, out);
    }
}
