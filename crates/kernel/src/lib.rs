//! Evaluation kernel: loads reference data and a message, builds the
//! evaluation tree, runs the rubric's SAMs, and projects a scorecard.

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluation_tree;
pub mod message_tree;
pub mod reference_data;
pub mod rubric;
pub mod sam;
pub mod scheduler;
pub mod scorecard;
pub mod types;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use scorecard::{Header, PiqiStatResponse};
