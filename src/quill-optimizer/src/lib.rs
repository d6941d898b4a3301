//! Query simplification for Quill expression trees.
//!
//! Runs metadata extraction, grouped-join flattening and null-check removal
//! over a query before it is handed to translation.

pub mod context;
pub mod correlation;
mod passes;
pub mod remapping;

pub use common_config::OptimizerConfig;
pub use context::{QueryCompilationContext, QueryMetadata};
pub use passes::{
    GroupJoinFlattening, MetadataExtraction, NullCheckRemoval, OptimizedQuery, PassTrace,
    QueryOptimizer, QueryPass, Transformed, simplify,
};
