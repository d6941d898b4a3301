//! Configuration management for Quill.
//!
//! Controls which simplification passes run and how the query metadata
//! defaults are seeded.

use serde::{Deserialize, Serialize};

/// Global Quill configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QuillConfig {
    /// Simplification pass configuration.
    pub optimizer: OptimizerConfig,
    /// Query metadata defaults.
    pub metadata: MetadataConfig,
}

/// Configuration for the pass sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Run the grouped-join flattening pass.
    pub flatten_group_joins: bool,
    /// Run the null-check simplification pass.
    pub remove_null_checks: bool,
    /// Record a before/after rendering of every pass.
    pub enable_trace: bool,
    /// Type-check the final tree before handing it off.
    pub validate_output: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            flatten_group_joins: true,
            remove_null_checks: true,
            enable_trace: false,
            validate_output: false,
        }
    }
}

impl OptimizerConfig {
    /// Enable or disable grouped-join flattening.
    #[must_use]
    pub fn with_group_join_flattening(mut self, enable: bool) -> Self {
        self.flatten_group_joins = enable;
        self
    }

    /// Enable or disable null-check simplification.
    #[must_use]
    pub fn with_null_check_removal(mut self, enable: bool) -> Self {
        self.remove_null_checks = enable;
        self
    }

    /// Enable or disable tracing.
    #[must_use]
    pub fn with_trace(mut self, enable: bool) -> Self {
        self.enable_trace = enable;
        self
    }

    /// Enable or disable output validation.
    #[must_use]
    pub fn with_validation(mut self, enable: bool) -> Self {
        self.validate_output = enable;
        self
    }
}

/// Defaults for query-level metadata collected during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Whether queries track returned entities unless told otherwise.
    pub default_tracking: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            default_tracking: true,
        }
    }
}
