//! Type system for Quill expressions.
//!
//! `Type` is the static result type carried by every expression node;
//! `Value` is what the in-memory interpreter produces.

mod data_type;
mod value;

pub use data_type::{RecordType, SequenceKind, TRANSPARENT_IDENTIFIER, Type};
pub use value::{RecordValue, Value};
