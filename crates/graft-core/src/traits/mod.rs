//! Traits for the external collaborators graft depends on.

mod dedup;
mod llm;

pub use dedup::*;
pub use llm::*;
