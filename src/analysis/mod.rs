//! Analysis module - the batch engine.
//!
//! - **Prompt filling**: [`prompt::fill`] substitutes code and path into a template
//! - **Normalization**: [`normalize::normalize`] maps any model reply onto [`AnalysisFields`](crate::model::AnalysisFields)
//! - **Pipeline**: [`pipeline::BatchOrchestrator`] runs files × prompts and builds the report

pub mod normalize;
pub mod pipeline;
pub mod prompt;

pub use normalize::{extract_json_object, normalize};
pub use pipeline::{select_units, BatchOrchestrator};
pub use prompt::{fill, preview};
