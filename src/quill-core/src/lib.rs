//! Core data model for Quill.
//!
//! This crate provides the pieces every other Quill crate builds on:
//! - `Type` and `Value` for the static type system and runtime values
//! - `EntityType` and the `MetadataCatalog` contract for mapped entities

pub mod metadata;
pub mod testing;
pub mod types;

// Re-export commonly used types
pub use metadata::{EntityType, MetadataCatalog, Model, Navigation, Property};
pub use types::{RecordType, RecordValue, SequenceKind, Type, Value};
