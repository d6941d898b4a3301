//! Intermediate node produced while flattening a grouped join.

use super::{Expr, ParameterExpr};
use crate::rewrite::Substitution;

/// A grouped join that has been rewritten into a flat join whose elements
/// are transparent identifiers, while the operators above it still expect
/// the grouped result.
///
/// Each downstream lambda is remapped onto the transparent identifier:
/// its parameter is replaced with `result_selector_body`, the group
/// parameter with `group_source`, and the outer and inner parameters with
/// the transparent identifier fields listed in `replacements`.
///
/// `grouped` is the equivalent tree that keeps the grouped join; it is used
/// when an operator that cannot be remapped consumes this node. This node
/// never survives the flattening pass.
#[derive(Debug, Clone)]
pub struct FlattenedGroupJoinExpr {
    source: Expr,
    grouped: Expr,
    result_selector_body: Expr,
    group_parameter: ParameterExpr,
    group_source: Expr,
    replacements: Substitution,
    transparent_identifier_parameter: ParameterExpr,
}

impl FlattenedGroupJoinExpr {
    /// Create a new flattened group join.
    pub fn new(
        source: Expr,
        grouped: Expr,
        result_selector_body: Expr,
        group_parameter: ParameterExpr,
        group_source: Expr,
        replacements: Substitution,
        transparent_identifier_parameter: ParameterExpr,
    ) -> Self {
        Self {
            source,
            grouped,
            result_selector_body,
            group_parameter,
            group_source,
            replacements,
            transparent_identifier_parameter,
        }
    }

    /// The flat join, or the flat join followed by remapped operators.
    pub const fn source(&self) -> &Expr {
        &self.source
    }

    /// The equivalent tree that keeps the grouped join.
    pub const fn grouped(&self) -> &Expr {
        &self.grouped
    }

    /// What a downstream lambda's parameter stands for.
    pub const fn result_selector_body(&self) -> &Expr {
        &self.result_selector_body
    }

    /// The group parameter of the original result selector.
    pub const fn group_parameter(&self) -> &ParameterExpr {
        &self.group_parameter
    }

    /// The group of one outer row, expressed over the outer parameter.
    pub const fn group_source(&self) -> &Expr {
        &self.group_source
    }

    /// Outer and inner parameters mapped to transparent identifier fields.
    pub const fn replacements(&self) -> &Substitution {
        &self.replacements
    }

    /// Parameter of the remapped lambdas.
    pub const fn transparent_identifier_parameter(&self) -> &ParameterExpr {
        &self.transparent_identifier_parameter
    }

    /// A copy over a new source.
    #[must_use]
    pub fn with_source(&self, source: Expr) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    /// A copy after one more operator was attached to both forms.
    #[must_use]
    pub fn advance(&self, source: Expr, grouped: Expr) -> Self {
        Self {
            source,
            grouped,
            ..self.clone()
        }
    }
}
