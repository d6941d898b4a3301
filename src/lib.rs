//! Quill - query-expression simplification for an object-relational mapper
//!
//! Quill rewrites language-integrated query trees into an equivalent form
//! built from primitive sequence operators before they are translated to SQL.

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

// Re-export core crates
pub use common_config as config;
pub use common_error as error;
pub use quill_core as core;
pub use quill_expr as expr;
pub use quill_optimizer as optimizer;

/// Quill version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
