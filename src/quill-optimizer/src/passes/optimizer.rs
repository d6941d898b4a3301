//! The pass sequencer.
//!
//! Passes run once each, in order, feeding each output to the next pass. A
//! failing pass aborts the whole translation.

use common_config::OptimizerConfig;
use common_error::QuillResult;
use log::{debug, trace};
use quill_expr::{Expr, validate};

use super::pass::{OptimizedQuery, PassTrace, QueryPass};
use super::{GroupJoinFlattening, MetadataExtraction, NullCheckRemoval};
use crate::context::QueryCompilationContext;

/// Runs simplification passes over a query tree.
///
/// # Pass Ordering
///
/// 1. Metadata extraction
/// 2. Grouped-join flattening
/// 3. Null-check simplification
///
/// Each pass runs exactly once; there is no fixpoint iteration.
pub struct QueryOptimizer {
    /// The passes to apply (in order).
    passes: Vec<Box<dyn QueryPass>>,
    /// Configuration.
    config: OptimizerConfig,
}

impl QueryOptimizer {
    /// Create a sequencer running the given passes.
    pub fn new(passes: Vec<Box<dyn QueryPass>>) -> Self {
        Self {
            passes,
            config: OptimizerConfig::default(),
        }
    }

    /// Create a sequencer with custom config.
    pub fn with_config(passes: Vec<Box<dyn QueryPass>>, config: OptimizerConfig) -> Self {
        Self { passes, config }
    }

    /// The standard passes, filtered by `config`.
    pub fn from_config(config: OptimizerConfig) -> Self {
        let mut passes: Vec<Box<dyn QueryPass>> = vec![Box::new(MetadataExtraction)];
        if config.flatten_group_joins {
            passes.push(Box::new(GroupJoinFlattening));
        }
        if config.remove_null_checks {
            passes.push(Box::new(NullCheckRemoval));
        }
        Self::with_config(passes, config)
    }

    /// Add a pass after the existing ones.
    pub fn add_pass<P: QueryPass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    /// Names of the configured passes, in order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Simplify `expr`.
    pub fn optimize(
        &self,
        expr: Expr,
        ctx: &mut QueryCompilationContext,
    ) -> QuillResult<OptimizedQuery> {
        let mut current = expr;
        let mut passes_applied = 0;
        let mut trace = Vec::new();

        for pass in &self.passes {
            let before = self.config.enable_trace.then(|| current.explain());

            let result = pass.apply(current, ctx).inspect_err(|err| {
                if err.is_unsupported() {
                    debug!("Pass '{}' rejected the query shape: {err}", pass.name());
                }
            })?;

            if result.changed {
                passes_applied += 1;
                debug!("Pass '{}' rewrote the query", pass.name());
            } else {
                trace!("Pass '{}' left the query unchanged", pass.name());
            }

            if let Some(before) = before {
                trace.push(PassTrace::new(
                    pass.name(),
                    before,
                    result.expr.explain(),
                    result.changed,
                ));
            }

            current = result.expr;
        }

        if self.config.validate_output {
            validate(&current)?;
        }

        Ok(OptimizedQuery {
            expr: current,
            metadata: ctx.metadata().clone(),
            passes_applied,
            trace,
        })
    }
}

impl Default for QueryOptimizer {
    fn default() -> Self {
        Self::from_config(OptimizerConfig::default())
    }
}

/// Run the standard passes over `expr` and return the rewritten tree.
pub fn simplify(expr: Expr, ctx: &mut QueryCompilationContext) -> QuillResult<Expr> {
    QueryOptimizer::default()
        .optimize(expr, ctx)
        .map(|optimized| optimized.expr)
}
