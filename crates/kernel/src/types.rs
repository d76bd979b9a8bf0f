//! The data model: entities, message items, evaluation items and results.
//!
//! `EvaluationItem`s live in an arena (a `Vec` indexed by `NodeId`) rather
//! than behind owning pointers, so parent/child and cross-result references
//! are cheap integer handles instead of a graph of `Rc<RefCell<..>>`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Handle into an [`crate::evaluation_tree::EvaluationTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Root,
    Class,
    Element,
    Attribute,
}

/// A node in the (frozen) entity model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub mnemonic: String,
    pub name: String,
    #[serde(rename = "fieldName")]
    pub field_name: String,
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub children: Vec<Entity>,
}

impl Entity {
    pub fn first_child(&self) -> Option<&Entity> {
        self.children.first()
    }

    pub fn child(&self, mnemonic: &str) -> Option<&Entity> {
        self.children.iter().find(|c| c.mnemonic == mnemonic)
    }
}

/// A node in the concrete message tree. Children are referenced by key
/// rather than by owning pointer so the tree has no ownership cycles.
#[derive(Debug, Clone)]
pub struct MessageModelItem {
    pub key: String,
    pub parent_key: Option<String>,
    pub mnemonic: String,
    pub element_sequence: Option<u32>,
    pub message_text: serde_json::Value,
    /// Attribute children, keyed by mnemonic.
    pub attributes: HashMap<String, String>,
    /// Element instance keys under a class item, in sequence order.
    pub element_instances: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringEffect {
    Scoring,
    Informational,
}

/// One parameter passed from a rubric criterion into a SAM invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

/// A reference to another criterion on the same entity, by (sam, sequence).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CriterionRef {
    pub sam_mnemonic: String,
    pub sequence: u32,
}

/// Declarative binding of one SAM to one entity, as expanded from a rubric.
#[derive(Debug, Clone)]
pub struct EvaluationCriterion {
    pub entity_mnemonic: String,
    pub sequence: u32,
    pub sam_mnemonic: String,
    pub scoring_effect: ScoringEffect,
    pub scoring_weight: u32,
    pub criticality_indicator: bool,
    pub sam_name_override: Option<String>,
    pub parameters: Vec<Parameter>,
    pub conditional_on: Option<CriterionRef>,
    pub dependent_on: Option<CriterionRef>,
}

impl EvaluationCriterion {
    pub fn key(&self) -> CriterionRef {
        CriterionRef {
            sam_mnemonic: self.sam_mnemonic.clone(),
            sequence: self.sequence,
        }
    }

    /// The dictionary key used across aggregation: `"{sam}.{sequence}"` is
    /// internal; the externally-visible keys compose entity/sam/cause, see
    /// `crate::aggregator`.
    pub fn slot_key(&self) -> String {
        format!("{}.{}", self.sam_mnemonic, self.sequence)
    }
}

/// Why a result was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipCause {
    /// The named conditional/dependent SAM caused the skip.
    Sam(String),
    /// The SAM itself returned `SKIPPED`.
    Self_,
    /// Traversal was cancelled before this slot could run.
    Cancelled,
}

/// Why a result failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailCause {
    /// The named dependent SAM caused the failure.
    Sam(String),
    /// The SAM itself returned `FAILED`.
    Self_,
    /// The SAM raised an unhandled error; `message` carries the detail.
    Errored { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalState {
    Pending,
    Passed,
    Failed { cause: FailCause, reason: Option<String> },
    Skipped { cause: SkipCause, reason: Option<String> },
}

impl EvalState {
    pub fn is_pending(&self) -> bool {
        matches!(self, EvalState::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, EvalState::Failed { .. })
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, EvalState::Passed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, EvalState::Skipped { .. })
    }
}

/// One instance of (item, criterion, SAM).
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub id: uuid::Uuid,
    pub item: NodeId,
    pub criterion: CriterionRef,
    pub is_conditional: bool,
    pub is_dependent: bool,
    pub state: EvalState,
    pub eval_performed: bool,
    pub custom_error_message: Option<String>,
}

impl EvaluationResult {
    pub fn pending(item: NodeId, criterion: &EvaluationCriterion, is_conditional: bool, is_dependent: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            item,
            criterion: criterion.key(),
            is_conditional,
            is_dependent,
            state: EvalState::Pending,
            eval_performed: false,
            custom_error_message: None,
        }
    }

    /// A gated (conditional/dependent) result is executed so its outcome is
    /// visible to `full_results`, but it never moves a scalar counter or a
    /// dictionary entry in the aggregator.
    pub fn contributes_to_aggregate(&self) -> bool {
        !(self.is_conditional || self.is_dependent)
    }

    /// Whether this result belongs in `EvaluationItem::full_results`: every
    /// non-gated result, plus gated results that actually ran to a
    /// non-skipped state.
    pub fn belongs_in_full_results(&self) -> bool {
        self.contributes_to_aggregate() || !self.state.is_skipped()
    }
}

/// What a SAM plug-in returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamOutcome {
    Succeeded,
    Failed { fail_reason: Option<String> },
    Skipped { skip_reason: Option<String> },
    Errored { error_message: String },
}

#[derive(Debug, Clone)]
pub struct SamResponse {
    pub outcome: SamOutcome,
}

impl SamResponse {
    pub fn succeeded() -> Self {
        Self { outcome: SamOutcome::Succeeded }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self { outcome: SamOutcome::Failed { fail_reason: Some(reason.into()) } }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self { outcome: SamOutcome::Skipped { skip_reason: Some(reason.into()) } }
    }

    pub fn errored(message: impl Into<String>) -> Self {
        Self { outcome: SamOutcome::Errored { error_message: message.into() } }
    }
}
