//! Collaborator clients for the PIQI evaluation kernel: FHIR terminology
//! lookups and knowledge-base plausibility checks.
//!
//! Mirrors the split in the `llm` crate this workspace grew out of: a plain
//! trait describing the capability, an HTTP implementation behind it, and a
//! scripted mock for tests that never touch the network.

pub mod client;
pub mod http;
pub mod mock;

pub use client::{
    CodingRef, FhirClient, KnowledgeClient, LabDeviceQuery, LabResultQuery, LookupOutcome,
    Plausibility, TerminologyError, ValueSetOutcome,
};
pub use http::{HttpFhirClient, HttpKnowledgeClient};
pub use mock::{MockFhirClient, MockKnowledgeClient};
