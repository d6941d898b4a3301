//! Null-check simplification pass.
//!
//! Member reads propagate `null`, so a guard like `e == null ? null : e.M`
//! computes the same value as `e.M` alone.

use common_error::QuillResult;
use log::debug;
use quill_expr::{BinaryOp, Expr, ExprKind, ExprRewriter, rewrite_children};

use super::pass::{QueryPass, Transformed};
use crate::context::QueryCompilationContext;

/// Removes null guards around member chains.
pub struct NullCheckRemoval;

impl QueryPass for NullCheckRemoval {
    fn name(&self) -> &'static str {
        "NullCheckRemoval"
    }

    fn description(&self) -> &'static str {
        "Fold null-guarded member chains to the bare chain"
    }

    fn apply(&self, expr: Expr, _ctx: &mut QueryCompilationContext) -> QuillResult<Transformed> {
        let rewritten = NullCheckRemover.rewrite(&expr)?;
        Ok(Transformed::compare(&expr, rewritten))
    }
}

struct NullCheckRemover;

impl ExprRewriter for NullCheckRemover {
    fn rewrite(&mut self, expr: &Expr) -> QuillResult<Expr> {
        let rewritten = rewrite_children(self, expr)?;
        if let Some(chain) = guarded_chain(&rewritten) {
            debug!("Removed null check around {chain}");
            return Ok(chain.clone());
        }
        Ok(rewritten)
    }
}

/// The member chain of `e == null ? null : chain` or `e != null ? chain : null`.
fn guarded_chain(expr: &Expr) -> Option<&Expr> {
    let ExprKind::Conditional {
        test,
        if_true,
        if_false,
        ..
    } = expr.kind()
    else {
        return None;
    };
    let ExprKind::Binary { op, left, right, .. } = test.kind() else {
        return None;
    };

    let checked = if right.is_null_constant() {
        left
    } else if left.is_null_constant() {
        right
    } else {
        return None;
    };

    let chain = match op {
        BinaryOp::Equal if if_true.is_null_constant() => if_false,
        BinaryOp::NotEqual if if_false.is_null_constant() => if_true,
        _ => return None,
    };

    is_member_chain_on(chain, checked).then_some(chain)
}

fn is_member_chain_on(chain: &Expr, root: &Expr) -> bool {
    let mut current = chain;
    while let ExprKind::Member { expr, .. } = current.kind() {
        if expr.structurally_eq(root) {
            return true;
        }
        current = expr;
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quill_core::{Model, Type};
    use quill_expr::ParameterExpr;

    use super::*;

    fn ctx() -> QueryCompilationContext {
        QueryCompilationContext::new(Arc::new(Model::new()))
    }

    fn customer() -> (ParameterExpr, Expr) {
        let o = ParameterExpr::new("o", Type::entity("Order"));
        let customer = Expr::member(Expr::parameter(&o), "Customer", Type::entity("Customer"));
        (o, customer)
    }

    #[test]
    fn test_equal_null_guard() {
        let (_, customer) = customer();
        let name = Expr::member(customer.clone(), "Name", Type::String);
        let guarded = Expr::conditional(
            Expr::equal(customer, Expr::null()).unwrap(),
            Expr::null(),
            name.clone(),
        )
        .unwrap();

        let result = NullCheckRemoval.apply(guarded, &mut ctx()).unwrap();
        assert!(result.changed);
        assert!(result.expr.ptr_eq(&name));
    }

    #[test]
    fn test_not_equal_null_guard_reversed_operands() {
        let (o, customer) = customer();
        let city = Expr::member(
            Expr::member(Expr::parameter(&o), "Customer", Type::entity("Customer")),
            "City",
            Type::String,
        );
        let guarded = Expr::conditional(
            Expr::not_equal(Expr::null(), customer).unwrap(),
            city.clone(),
            Expr::null(),
        )
        .unwrap();

        let result = NullCheckRemoval.apply(guarded, &mut ctx()).unwrap();
        assert!(result.expr.ptr_eq(&city));
    }

    #[test]
    fn test_unrelated_chain_is_kept() {
        let (o, customer) = customer();
        let other = Expr::member(Expr::parameter(&o), "Id", Type::Int64);
        let guarded = Expr::conditional(
            Expr::equal(customer, Expr::null()).unwrap(),
            Expr::null(),
            other,
        )
        .unwrap();

        let result = NullCheckRemoval.apply(guarded.clone(), &mut ctx()).unwrap();
        assert!(!result.changed);
        assert!(result.expr.ptr_eq(&guarded));
    }

    #[test]
    fn test_non_null_fallback_is_kept() {
        let (_, customer) = customer();
        let name = Expr::member(customer.clone(), "Name", Type::String);
        let guarded = Expr::conditional(
            Expr::equal(customer, Expr::null()).unwrap(),
            Expr::constant("unknown"),
            name,
        )
        .unwrap();

        let result = NullCheckRemoval.apply(guarded, &mut ctx()).unwrap();
        assert!(!result.changed);
    }
}
