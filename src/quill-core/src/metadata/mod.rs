//! Entity metadata consumed by the simplification passes.
//!
//! The catalog is an external collaborator: passes only need to resolve a
//! query root to an [`EntityType`] and read its runtime type and stored
//! members.

mod catalog;
mod entity;

pub use catalog::{MetadataCatalog, Model};
pub use entity::{EntityType, Navigation, Property};
