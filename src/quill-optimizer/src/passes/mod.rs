//! Simplification passes for Quill query trees.
//!
//! # Passes
//!
//! - **Metadata Extraction**: bind query roots to entity metadata and lift
//!   query-level markers into the compilation context
//! - **Grouped-Join Flattening**: rewrite `GroupJoin` + `SelectMany` into
//!   flat joins
//! - **Null-Check Removal**: fold null guards around member chains
//!
//! # Rewrite Safety
//!
//! A rewrite is **legal** only if evaluating the rewritten tree yields the
//! same rows as the original for every data source. Untouched subtrees are
//! shared, so a pass that changes nothing returns its input node.

mod group_join_flattening;
mod metadata_extraction;
mod null_check_removal;
mod optimizer;
mod pass;

pub use group_join_flattening::GroupJoinFlattening;
pub use metadata_extraction::MetadataExtraction;
pub use null_check_removal::NullCheckRemoval;
pub use optimizer::{QueryOptimizer, simplify};
pub use pass::{OptimizedQuery, PassTrace, QueryPass, Transformed};
