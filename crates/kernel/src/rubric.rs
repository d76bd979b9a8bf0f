//! Expands a rubric's criteria into the pending result slots on every
//! matching evaluation item, after verifying the conditional/dependent
//! graph is acyclic.

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::evaluation_tree::EvaluationTree;
use crate::reference_data::Rubric;
use crate::types::{CriterionRef, EvaluationCriterion, EvaluationResult};

/// Checks every entity's conditional/dependent graph for cycles and, if
/// clean, materializes one pending [`EvaluationResult`] slot per criterion
/// on every evaluation item whose entity mnemonic matches.
pub fn plan(tree: &mut EvaluationTree, rubric: &Rubric) -> Result<()> {
    let mut by_entity: HashMap<&str, Vec<&EvaluationCriterion>> = HashMap::new();
    for c in &rubric.criteria {
        by_entity.entry(c.entity_mnemonic.as_str()).or_default().push(c);
    }

    for (entity, criteria) in &by_entity {
        check_acyclic(entity, criteria)?;
    }

    for node_id in tree.post_order() {
        let entity_mnemonic = tree.get(node_id).entity_mnemonic.clone();
        let Some(criteria) = by_entity.get(entity_mnemonic.as_str()) else {
            continue;
        };
        for criterion in criteria {
            let result = EvaluationResult::pending(
                node_id,
                criterion,
                criterion.conditional_on.is_some(),
                criterion.dependent_on.is_some(),
            );
            tree.get_mut(node_id)
                .criteria_results
                .insert(criterion.slot_key(), result);
        }
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

fn check_acyclic(entity: &str, criteria: &[&EvaluationCriterion]) -> Result<()> {
    let by_ref: HashMap<CriterionRef, &EvaluationCriterion> =
        criteria.iter().map(|c| (c.key(), *c)).collect();
    let mut colors: HashMap<CriterionRef, Color> = HashMap::new();

    for c in criteria {
        let key = c.key();
        if !matches!(colors.get(&key), None | Some(Color::White)) {
            continue;
        }
        if let Some(cycle_at) = visit(&key, &by_ref, &mut colors) {
            return Err(EngineError::InvalidRubric(format!(
                "cyclic conditional/dependent graph on entity {entity} at criterion {}.{}",
                cycle_at.sam_mnemonic, cycle_at.sequence
            )));
        }
    }
    Ok(())
}

fn visit(
    key: &CriterionRef,
    by_ref: &HashMap<CriterionRef, &EvaluationCriterion>,
    colors: &mut HashMap<CriterionRef, Color>,
) -> Option<CriterionRef> {
    colors.insert(key.clone(), Color::Gray);

    let criterion = by_ref.get(key)?;
    let mut edges: Vec<&CriterionRef> = Vec::new();
    if let Some(r) = &criterion.conditional_on {
        edges.push(r);
    }
    if let Some(r) = &criterion.dependent_on {
        edges.push(r);
    }

    for edge in edges {
        match colors.get(edge) {
            Some(Color::Gray) => return Some(edge.clone()),
            Some(Color::Black) => continue,
            _ => {
                if let Some(cycle) = visit(edge, by_ref, colors) {
                    return Some(cycle);
                }
            }
        }
    }

    colors.insert(key.clone(), Color::Black);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, EntityType, ScoringEffect};

    fn crit(
        sam: &str,
        seq: u32,
        conditional_on: Option<(&str, u32)>,
        dependent_on: Option<(&str, u32)>,
    ) -> EvaluationCriterion {
        EvaluationCriterion {
            entity_mnemonic: "PID".into(),
            sequence: seq,
            sam_mnemonic: sam.into(),
            scoring_effect: ScoringEffect::Scoring,
            scoring_weight: 1,
            criticality_indicator: false,
            sam_name_override: None,
            parameters: vec![],
            conditional_on: conditional_on.map(|(s, n)| CriterionRef {
                sam_mnemonic: s.into(),
                sequence: n,
            }),
            dependent_on: dependent_on.map(|(s, n)| CriterionRef {
                sam_mnemonic: s.into(),
                sequence: n,
            }),
        }
    }

    fn one_item_tree(entity_mnemonic: &str) -> EvaluationTree {
        let root = Entity {
            mnemonic: "MSG".into(),
            name: "Message".into(),
            field_name: "msg".into(),
            entity_type: EntityType::Root,
            children: vec![],
        };
        let idx = crate::reference_data::ReferenceDataIndex::load(
            &format!(
                r#"{{"ModelLibrary":[{{"mnemonic":"MSG","name":"Message","fieldName":"msg","entityType":"root","children":[{{"mnemonic":"{entity_mnemonic}","name":"X","fieldName":"x","entityType":"class","children":[]}}]}}],"EvaluationProfileLibrary":[{{"mnemonic":"R","EvaluationCriteria":[]}}]}}"#
            ),
            None,
        )
        .unwrap();
        let _ = root;
        let msg = crate::message_tree::MessageTree::parse(r#"{"mnemonic":"MSG"}"#, "MSG").unwrap();
        EvaluationTree::build(&idx, &msg)
    }

    #[test]
    fn detects_two_criterion_cycle() {
        let criteria = [
            crit("A", 1, None, Some(("B", 1))),
            crit("B", 1, None, Some(("A", 1))),
        ];
        let refs: Vec<&EvaluationCriterion> = criteria.iter().collect();
        let err = check_acyclic("PID", &refs).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRubric(_)));
    }

    #[test]
    fn accepts_acyclic_chain() {
        let criteria = [
            crit("A", 1, None, None),
            crit("B", 1, Some(("A", 1)), None),
        ];
        let refs: Vec<&EvaluationCriterion> = criteria.iter().collect();
        assert!(check_acyclic("PID", &refs).is_ok());
    }

    #[test]
    fn plan_creates_one_slot_per_criterion_per_matching_item() {
        let mut tree = one_item_tree("PID");
        let rubric = Rubric {
            mnemonic: "R".into(),
            name: "R".into(),
            criteria: vec![crit("element-is-clean", 1, None, None)],
        };
        plan(&mut tree, &rubric).unwrap();
        let class_id = tree.get(tree.root).children[0];
        assert_eq!(tree.get(class_id).criteria_results.len(), 1);
    }
}
