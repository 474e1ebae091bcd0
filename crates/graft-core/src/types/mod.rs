//! Core data model: entities, relationships and graph containers.

mod entity;
mod graph;
mod message;
mod relationship;

pub use entity::*;
pub use graph::*;
pub use message::*;
pub use relationship::*;
