//! Correlation verification for grouped-join collection selectors.
//!
//! A collection selector is uncorrelated when it only filters or projects
//! the group element by element, so it can be applied to the whole inner
//! sequence instead of each group. Anything the checker cannot prove safe is
//! reported as correlated.

use quill_expr::{DeclaringType, Expr, ExprKind, MethodCallExpr, ParamId, ParameterExpr, SequenceOp};

/// Whether `group` appears anywhere in `expr`.
pub fn references_group(expr: &Expr, group: &ParameterExpr) -> bool {
    expr.references(group)
}

/// Whether `expr` depends on anything besides a single navigation chain
/// rooted at `root`.
///
/// Uncorrelated expressions reference `root` exactly once, at the bottom of a
/// chain of member reads and element-wise `Where`/`Select` calls, and every
/// other parameter they mention is bound by a lambda inside them.
pub fn is_correlated(expr: &Expr, root: &ParameterExpr) -> bool {
    if !is_navigation_chain(expr, root) {
        return true;
    }

    let mut checker = CorrelationChecker {
        root: root.id(),
        allowed: Vec::new(),
        root_references: 0,
        correlated: false,
    };
    checker.visit(expr);
    checker.correlated || checker.root_references != 1
}

struct CorrelationChecker {
    root: ParamId,
    allowed: Vec<ParamId>,
    root_references: usize,
    correlated: bool,
}

impl CorrelationChecker {
    fn visit(&mut self, expr: &Expr) {
        if self.correlated {
            return;
        }

        match expr.kind() {
            ExprKind::Parameter(p) => {
                if p.id() == self.root {
                    self.root_references += 1;
                } else if !self.allowed.contains(&p.id()) {
                    self.correlated = true;
                }
            }
            ExprKind::Lambda(lambda) => {
                let depth = self.allowed.len();
                self.allowed.extend(lambda.params().iter().map(ParameterExpr::id));
                self.visit(lambda.body());
                self.allowed.truncate(depth);
            }
            ExprKind::Call(call) if !is_element_wise(call) => self.correlated = true,
            ExprKind::FlattenedGroupJoin(_) => self.correlated = true,
            _ => {
                for child in expr.children() {
                    self.visit(child);
                }
            }
        }
    }
}

fn is_element_wise(call: &MethodCallExpr) -> bool {
    matches!(
        (call.declaring(), call.op()),
        (DeclaringType::Enumerable, SequenceOp::Where | SequenceOp::Select)
            | (DeclaringType::Queryable, SequenceOp::Where)
    )
}

fn is_navigation_chain(expr: &Expr, root: &ParameterExpr) -> bool {
    match expr.kind() {
        ExprKind::Parameter(p) => p == root,
        ExprKind::Member { expr, .. } => is_navigation_chain(expr, root),
        ExprKind::Call(call) if is_element_wise(call) => is_navigation_chain(call.source(), root),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use quill_core::Type;
    use quill_expr::query::{enumerable, lambda};
    use quill_expr::BinaryOp;

    use super::*;

    fn inner() -> Type {
        Type::entity("Inner")
    }

    fn group() -> ParameterExpr {
        ParameterExpr::new("g", Type::enumerable(inner()))
    }

    fn key_above(threshold: i64) -> Expr {
        lambda(&[("i", inner())], |p| {
            Expr::binary(
                BinaryOp::GreaterThan,
                Expr::member(p[0].clone(), "Key", Type::Int64),
                Expr::constant(threshold),
            )
        })
        .unwrap()
    }

    #[test]
    fn test_bare_group_is_uncorrelated() {
        let g = group();
        assert!(!is_correlated(&Expr::parameter(&g), &g));
    }

    #[test]
    fn test_filtered_group_is_uncorrelated() {
        let g = group();
        let filtered = enumerable::where_(Expr::parameter(&g), key_above(1)).unwrap();
        assert!(!is_correlated(&filtered, &g));
        assert!(references_group(&filtered, &g));
    }

    #[test]
    fn test_outer_reference_is_correlated() {
        let g = group();
        let o = ParameterExpr::new("o", Type::entity("Outer"));
        let filtered = enumerable::where_(
            Expr::parameter(&g),
            lambda(&[("i", inner())], |p| {
                Expr::equal(
                    Expr::member(p[0].clone(), "Key", Type::Int64),
                    Expr::member(Expr::parameter(&o), "Id", Type::Int64),
                )
            })
            .unwrap(),
        )
        .unwrap();

        assert!(is_correlated(&filtered, &g));
    }

    #[test]
    fn test_second_root_reference_is_correlated() {
        let g = group();
        let filtered = enumerable::where_(
            Expr::parameter(&g),
            lambda(&[("i", inner())], |_| {
                Expr::binary(
                    BinaryOp::GreaterThan,
                    enumerable::count(Expr::parameter(&g))?,
                    Expr::constant(1i64),
                )
            })
            .unwrap(),
        )
        .unwrap();

        assert!(is_correlated(&filtered, &g));
    }

    #[test]
    fn test_group_wide_operators_are_correlated() {
        let g = group();
        let taken = enumerable::take(Expr::parameter(&g), 1).unwrap();
        assert!(is_correlated(&taken, &g));

        let counted = enumerable::count(Expr::parameter(&g)).unwrap();
        assert!(is_correlated(&counted, &g));
    }

    #[test]
    fn test_unrelated_expression_is_correlated() {
        let g = group();
        assert!(is_correlated(&Expr::query_root("Inner"), &g));
        assert!(!references_group(&Expr::query_root("Inner"), &g));
    }

    #[test]
    fn test_member_navigation_is_uncorrelated() {
        let g = ParameterExpr::new("g", Type::entity("Customer"));
        let orders = Expr::member(
            Expr::parameter(&g),
            "Orders",
            Type::enumerable(Type::entity("Order")),
        );
        assert!(!is_correlated(&orders, &g));
    }

    #[test]
    fn test_projected_group_is_uncorrelated() {
        let g = group();
        let ids = enumerable::select(
            Expr::parameter(&g),
            lambda(&[("x", inner())], |p| {
                Ok(Expr::member(p[0].clone(), "Id", Type::Int64))
            })
            .unwrap(),
        )
        .unwrap();
        assert!(!is_correlated(&ids, &g));
    }

    /// One link of a navigation chain over the group.
    fn step(chain: Expr, kind: u8, threshold: i64) -> Expr {
        match kind {
            0 => enumerable::where_(chain, key_above(threshold)).unwrap(),
            1 => {
                let identity = lambda(&[("x", inner())], |p| Ok(p[0].clone())).unwrap();
                enumerable::select(chain, identity).unwrap()
            }
            _ => Expr::member(chain, "Siblings", Type::enumerable(inner())),
        }
    }

    proptest! {
        #[test]
        fn prop_navigation_chains_are_uncorrelated_until_tainted(
            steps in prop::collection::vec((0u8..3, 0i64..5), 0..6),
            outer_taint in any::<bool>(),
        ) {
            let g = group();
            let chain = steps.iter().fold(Expr::parameter(&g), |chain, &(kind, threshold)| {
                step(chain, kind, threshold)
            });
            prop_assert!(!is_correlated(&chain, &g));

            let o = ParameterExpr::new("o", Type::entity("Outer"));
            let tainted = enumerable::where_(
                chain,
                lambda(&[("i", inner())], |p| {
                    let other = if outer_taint {
                        Expr::member(Expr::parameter(&o), "Id", Type::Int64)
                    } else {
                        enumerable::count(Expr::parameter(&g))?
                    };
                    Expr::equal(Expr::member(p[0].clone(), "Key", Type::Int64), other)
                })
                .unwrap(),
            )
            .unwrap();
            prop_assert!(is_correlated(&tainted, &g));
        }
    }
}
