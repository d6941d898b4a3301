//! Per-translation compilation state.

use std::sync::Arc;

use common_config::MetadataConfig;
use quill_core::MetadataCatalog;

/// Query-level options lifted out of the tree by metadata extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMetadata {
    /// Whether returned entities are tracked.
    pub tracking: bool,
    /// Tags attached with `TagWith`, innermost first.
    pub tags: Vec<String>,
    /// Whether model-level query filters are skipped.
    pub ignore_query_filters: bool,
}

impl QueryMetadata {
    /// Metadata before any marker has been seen.
    pub fn new(config: &MetadataConfig) -> Self {
        Self {
            tracking: config.default_tracking,
            tags: Vec::new(),
            ignore_query_filters: false,
        }
    }
}

impl Default for QueryMetadata {
    fn default() -> Self {
        Self::new(&MetadataConfig::default())
    }
}

/// State shared by the passes of one translation.
#[derive(Debug, Clone)]
pub struct QueryCompilationContext {
    catalog: Arc<dyn MetadataCatalog>,
    metadata: QueryMetadata,
}

impl QueryCompilationContext {
    /// Create a context resolving entities through `catalog`.
    pub fn new(catalog: Arc<dyn MetadataCatalog>) -> Self {
        Self::with_config(catalog, &MetadataConfig::default())
    }

    /// Create a context with explicit metadata defaults.
    pub fn with_config(catalog: Arc<dyn MetadataCatalog>, config: &MetadataConfig) -> Self {
        Self {
            catalog,
            metadata: QueryMetadata::new(config),
        }
    }

    /// Entity metadata lookup.
    pub fn catalog(&self) -> &dyn MetadataCatalog {
        self.catalog.as_ref()
    }

    /// Query-level metadata collected so far.
    pub const fn metadata(&self) -> &QueryMetadata {
        &self.metadata
    }

    /// Mutable access for the extraction pass.
    pub fn metadata_mut(&mut self) -> &mut QueryMetadata {
        &mut self.metadata
    }
}
