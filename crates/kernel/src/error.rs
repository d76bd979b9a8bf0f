//! The fatal error taxonomy. Everything here aborts the current evaluation
//! before a scorecard is produced. Collaborator and SAM-level errors never
//! appear as variants here: they're localized to a single result slot (see
//! `crate::types::SamOutcome::Errored`) and never escape `Engine::evaluate`.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid reference data: {0}")]
    InvalidReferenceData(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid rubric: {0}")]
    InvalidRubric(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
