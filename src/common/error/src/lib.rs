//! Error types and result aliases for Quill.
//!
//! Every pass, builder and the interpreter report failures through
//! [`QuillError`]; a failure anywhere aborts the whole translation.

mod error;

pub use error::{QuillError, QuillResult};
