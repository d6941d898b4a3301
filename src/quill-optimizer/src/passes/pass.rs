//! Simplification pass trait and results.

use common_error::QuillResult;
use quill_expr::Expr;

use crate::context::{QueryCompilationContext, QueryMetadata};

/// A tree-to-tree simplification pass.
///
/// A pass must preserve the value of the query: evaluating the rewritten
/// tree over any rows yields the same result as the original.
pub trait QueryPass: Send + Sync {
    /// Get the name of this pass.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Apply this pass to the tree.
    fn apply(&self, expr: Expr, ctx: &mut QueryCompilationContext) -> QuillResult<Transformed>;
}

/// The result of applying a pass.
#[derive(Debug, Clone)]
pub struct Transformed {
    /// The (potentially rewritten) tree.
    pub expr: Expr,
    /// Whether the tree was actually changed.
    pub changed: bool,
}

impl Transformed {
    /// Create a result indicating the tree was changed.
    pub fn yes(expr: Expr) -> Self {
        Self {
            expr,
            changed: true,
        }
    }

    /// Create a result indicating the tree was unchanged.
    pub fn no(expr: Expr) -> Self {
        Self {
            expr,
            changed: false,
        }
    }

    /// Compare a rewrite result against its input by identity.
    pub fn compare(before: &Expr, after: Expr) -> Self {
        if after.ptr_eq(before) {
            Self::no(after)
        } else {
            Self::yes(after)
        }
    }
}

impl From<Expr> for Transformed {
    fn from(expr: Expr) -> Self {
        Self::no(expr)
    }
}

/// A trace entry for a single pass.
#[derive(Debug, Clone)]
pub struct PassTrace {
    /// The name of the pass.
    pub pass_name: String,
    /// The tree before the pass (as explain string).
    pub before: String,
    /// The tree after the pass (as explain string).
    pub after: String,
    /// Whether the pass changed the tree.
    pub changed: bool,
}

impl PassTrace {
    /// Create a new trace entry.
    pub fn new(
        pass_name: impl Into<String>,
        before: impl Into<String>,
        after: impl Into<String>,
        changed: bool,
    ) -> Self {
        Self {
            pass_name: pass_name.into(),
            before: before.into(),
            after: after.into(),
            changed,
        }
    }
}

/// The result of simplification.
#[derive(Debug, Clone)]
pub struct OptimizedQuery {
    /// The final tree.
    pub expr: Expr,
    /// Query-level options extracted from the tree.
    pub metadata: QueryMetadata,
    /// Number of passes that changed the tree.
    pub passes_applied: usize,
    /// Per-pass trace (if tracing was enabled).
    pub trace: Vec<PassTrace>,
}

impl OptimizedQuery {
    /// Format the trace as a human-readable string.
    pub fn format_trace(&self) -> String {
        let mut output = format!("Simplification applied {} passes\n", self.passes_applied);

        if self.trace.is_empty() {
            output.push_str("  (no trace available)\n");
        } else {
            for entry in &self.trace {
                if !entry.changed {
                    output.push_str(&format!("\n--- {}: no change ---\n", entry.pass_name));
                    continue;
                }
                output.push_str(&format!("\n--- {} ---\n", entry.pass_name));
                output.push_str("Before:\n");
                output.push_str(&entry.before);
                output.push_str("After:\n");
                output.push_str(&entry.after);
            }
        }

        output
    }
}
