use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use piqi_terminology::{CodingRef, FhirClient, LookupOutcome, TerminologyError, ValueSetOutcome};

use super::Sam;
use crate::evaluation_tree::EvaluationTree;
use crate::types::{NodeId, Parameter, SamResponse};

const TIMEOUT_REASON: &str = "collaborator call timed out";

/// An attribute's value is carried as `"system|code"` for any coding-bearing
/// field; anything else is treated as not coded and always passes (there is
/// nothing to look up).
fn parse_coding(raw: &str) -> Option<CodingRef> {
    let (system, code) = raw.split_once('|')?;
    Some(CodingRef {
        system: system.to_string(),
        code: code.to_string(),
    })
}

fn errored(e: TerminologyError) -> SamResponse {
    SamResponse::errored(e.to_string())
}

/// Validates that an item's coded attribute resolves against its code
/// system — the code lookup must succeed (2xx, found) for the SAM to pass.
pub struct CodeSystemInteroperability {
    fhir: Arc<dyn FhirClient>,
    timeout: Duration,
}

impl CodeSystemInteroperability {
    pub fn new(fhir: Arc<dyn FhirClient>, timeout: Duration) -> Self {
        Self { fhir, timeout }
    }
}

#[async_trait]
impl Sam for CodeSystemInteroperability {
    fn mnemonic(&self) -> &str {
        "code-system-interoperability"
    }

    async fn evaluate(&self, tree: &EvaluationTree, item: NodeId, _parameters: &[Parameter]) -> SamResponse {
        let Some(raw) = tree.get(item).attribute_value.as_deref() else {
            return SamResponse::skipped("no attribute value present");
        };
        let Some(coding) = parse_coding(raw) else {
            return SamResponse::succeeded();
        };
        match tokio::time::timeout(self.timeout, self.fhir.lookup_code(&coding)).await {
            Ok(Ok(LookupOutcome::Found { .. })) => SamResponse::succeeded(),
            Ok(Ok(LookupOutcome::NotFound)) => SamResponse::failed(format!(
                "code {} not recognized in system {}",
                coding.code, coding.system
            )),
            Ok(Err(e)) => errored(e),
            Err(_) => SamResponse::errored(TIMEOUT_REASON),
        }
    }
}

/// Populates display text for a coding via `$lookup`; a 400 ("no such
/// code") does not fail the SAM, it just leaves the display unset.
pub struct ReferenceDisplayPopulation {
    fhir: Arc<dyn FhirClient>,
    timeout: Duration,
}

impl ReferenceDisplayPopulation {
    pub fn new(fhir: Arc<dyn FhirClient>, timeout: Duration) -> Self {
        Self { fhir, timeout }
    }
}

#[async_trait]
impl Sam for ReferenceDisplayPopulation {
    fn mnemonic(&self) -> &str {
        "reference-display-population"
    }

    async fn evaluate(&self, tree: &EvaluationTree, item: NodeId, _parameters: &[Parameter]) -> SamResponse {
        let Some(raw) = tree.get(item).attribute_value.as_deref() else {
            return SamResponse::skipped("no attribute value present");
        };
        let Some(coding) = parse_coding(raw) else {
            return SamResponse::succeeded();
        };
        match tokio::time::timeout(self.timeout, self.fhir.lookup_code(&coding)).await {
            Ok(Ok(LookupOutcome::Found { .. })) => SamResponse::succeeded(),
            Ok(Ok(LookupOutcome::NotFound)) => SamResponse::succeeded(),
            Ok(Err(e)) => errored(e),
            Err(_) => SamResponse::errored(TIMEOUT_REASON),
        }
    }
}

/// Checks a coded attribute against a value set's expansion. The target
/// value set mnemonic is read from the `valueSet` parameter.
pub struct ValueSetMembership {
    fhir: Arc<dyn FhirClient>,
    timeout: Duration,
}

impl ValueSetMembership {
    pub fn new(fhir: Arc<dyn FhirClient>, timeout: Duration) -> Self {
        Self { fhir, timeout }
    }
}

#[async_trait]
impl Sam for ValueSetMembership {
    fn mnemonic(&self) -> &str {
        "value-set-membership"
    }

    async fn evaluate(&self, tree: &EvaluationTree, item: NodeId, parameters: &[Parameter]) -> SamResponse {
        let Some(raw) = tree.get(item).attribute_value.as_deref() else {
            return SamResponse::skipped("no attribute value present");
        };
        let Some(coding) = parse_coding(raw) else {
            return SamResponse::succeeded();
        };
        let Some(value_set) = parameters.iter().find(|p| p.name == "valueSet") else {
            return SamResponse::errored("value-set-membership requires a valueSet parameter");
        };

        match tokio::time::timeout(self.timeout, self.fhir.get_value_set(&value_set.value)).await {
            Ok(Ok(ValueSetOutcome::Expanded { codings })) => {
                if codings.contains(&coding) {
                    SamResponse::succeeded()
                } else {
                    SamResponse::failed(format!(
                        "code {} not a member of value set {}",
                        coding.code, value_set.value
                    ))
                }
            }
            Ok(Ok(ValueSetOutcome::NotFound)) => {
                SamResponse::failed(format!("value set {} not found", value_set.value))
            }
            Ok(Err(e)) => errored(e),
            Err(_) => SamResponse::errored(TIMEOUT_REASON),
        }
    }
}
