use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors a collaborator client can surface to a SAM.
///
/// Every variant here is meant to be caught at the SAM boundary and folded
/// into a [`crate::LookupOutcome`]-shaped `SAMResponse::Errored`, never
/// propagated as a bare `Result::Err` out of the evaluation kernel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TerminologyError {
    #[error("collaborator returned unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("collaborator request failed: {0}")]
    Transport(String),
    #[error("collaborator response could not be parsed: {0}")]
    Malformed(String),
}

/// A single `system|code` pair as carried on a `CodeableConcept.coding`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodingRef {
    pub system: String,
    pub code: String,
}

/// Outcome of a `$lookup` call against a coding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// 2xx: the code is known; carries the display strings the FHIR
    /// terminology server returned for it.
    Found { displays: Vec<String> },
    /// HTTP 400: the code is not recognized in that system. Not an error.
    NotFound,
}

/// Outcome of a value-set expansion/membership check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSetOutcome {
    Expanded { codings: Vec<CodingRef> },
    NotFound,
}

/// The FHIR terminology capability a SAM depends on.
#[async_trait]
pub trait FhirClient: Send + Sync {
    async fn lookup_code(&self, coding: &CodingRef) -> Result<LookupOutcome, TerminologyError>;

    async fn get_value_set(&self, mnemonic_or_uri: &str)
    -> Result<ValueSetOutcome, TerminologyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plausibility {
    Plausible,
    Implausible,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct LabResultQuery {
    pub date_of_birth: String,
    pub test_code: String,
    pub result_value: String,
    pub stamp: String,
    pub lang: String,
    pub nav: String,
}

#[derive(Debug, Clone)]
pub struct LabDeviceQuery {
    pub test_code: String,
    pub ref_range_low: String,
    pub ref_range_high: String,
    pub unit: String,
    pub stamp: String,
    pub lang: String,
    pub nav: String,
}

/// The knowledge-base plausibility capability a SAM depends on.
#[async_trait]
pub trait KnowledgeClient: Send + Sync {
    async fn lab_result_plausibility(
        &self,
        query: &LabResultQuery,
    ) -> Result<Plausibility, TerminologyError>;

    async fn lab_device_plausibility(
        &self,
        query: &LabDeviceQuery,
    ) -> Result<Plausibility, TerminologyError>;
}
