//! The SAM registry: named, pluggable scoring-and-assessment methods.
//! Mirrors a builtin-capability registry — a flat map from mnemonic to
//! trait object, looked up by name, no inheritance hierarchy.

pub mod knowledge;
pub mod structural;
pub mod terminology;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::evaluation_tree::EvaluationTree;
use crate::types::{NodeId, Parameter, SamResponse};

/// A named, pluggable evaluation check.
#[async_trait]
pub trait Sam: Send + Sync {
    fn mnemonic(&self) -> &str;

    async fn evaluate(
        &self,
        tree: &EvaluationTree,
        item: NodeId,
        parameters: &[Parameter],
    ) -> SamResponse;
}

pub struct SamRegistry {
    sams: HashMap<String, Arc<dyn Sam>>,
}

impl SamRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            sams: HashMap::new(),
        };
        registry.register(Arc::new(structural::ElementIsClean));
        registry
    }

    /// Builds a registry with the terminology/knowledge-backed SAMs wired
    /// to the given collaborator clients, in addition to the structural
    /// SAMs every registry carries.
    pub fn with_collaborators(
        fhir: Arc<dyn piqi_terminology::FhirClient>,
        knowledge: Arc<dyn piqi_terminology::KnowledgeClient>,
        timeout: Duration,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(terminology::CodeSystemInteroperability::new(fhir.clone(), timeout)));
        registry.register(Arc::new(terminology::ReferenceDisplayPopulation::new(fhir.clone(), timeout)));
        registry.register(Arc::new(terminology::ValueSetMembership::new(fhir, timeout)));
        registry.register(Arc::new(knowledge::LabResultPlausibility::new(knowledge.clone(), timeout)));
        registry.register(Arc::new(knowledge::LabDevicePlausibility::new(knowledge, timeout)));
        registry
    }

    pub fn register(&mut self, sam: Arc<dyn Sam>) {
        self.sams.insert(sam.mnemonic().to_string(), sam);
    }

    pub fn get(&self, mnemonic: &str) -> Option<Arc<dyn Sam>> {
        self.sams.get(mnemonic).cloned()
    }

    pub fn contains(&self, mnemonic: &str) -> bool {
        self.sams.contains_key(mnemonic)
    }

    /// Names of every registered SAM, sorted for deterministic listings.
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sams.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for SamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_structural_sam_by_default() {
        let registry = SamRegistry::new();
        assert!(registry.contains("element-is-clean"));
    }

    #[test]
    fn list_names_is_sorted() {
        let registry = SamRegistry::new();
        let names = registry.list_names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
