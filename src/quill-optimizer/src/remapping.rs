//! Enumerable to queryable operator remapping.
//!
//! When an in-memory operator chain ends up applied to a translatable
//! sequence, each call is switched to the translatable operator of the same
//! name and arity so that later stages can translate it.

use std::collections::HashMap;
use std::sync::OnceLock;

use common_error::{QuillError, QuillResult};
use quill_core::SequenceKind;
use quill_expr::{
    DeclaringType, Expr, ExprKind, ExprRewriter, MethodCallExpr, MethodSignature, SequenceOp,
    rewrite_children,
};

type OverloadTable = HashMap<(SequenceOp, usize), Vec<&'static MethodSignature>>;

static QUERYABLE_OVERLOADS: OnceLock<OverloadTable> = OnceLock::new();

fn queryable_overloads() -> &'static OverloadTable {
    QUERYABLE_OVERLOADS.get_or_init(|| {
        let mut table = OverloadTable::new();
        for method in MethodSignature::declared_by(DeclaringType::Queryable) {
            if !method.is_indexed() {
                table
                    .entry((method.op, method.arity()))
                    .or_default()
                    .push(method);
            }
        }
        table
    })
}

/// The translatable operator equivalent to an in-memory one.
///
/// Index-taking overloads have no equivalent. Translatable operators map to
/// themselves.
pub fn queryable_counterpart(
    method: &'static MethodSignature,
) -> QuillResult<&'static MethodSignature> {
    match method.declaring {
        DeclaringType::Queryable | DeclaringType::EntityQueryable => return Ok(method),
        DeclaringType::Enumerable => {}
    }

    if method.is_indexed() {
        return Err(QuillError::no_equivalent_operator(format!(
            "{method} takes an element index and has no translatable equivalent"
        )));
    }

    match queryable_overloads()
        .get(&(method.op, method.arity()))
        .map(Vec::as_slice)
    {
        Some([single]) => Ok(*single),
        Some(candidates) => Err(QuillError::no_equivalent_operator(format!(
            "{method} matches {} translatable overloads",
            candidates.len()
        ))),
        None => Err(QuillError::no_equivalent_operator(format!(
            "{method} has no translatable equivalent"
        ))),
    }
}

/// The same call expressed with the translatable operator.
pub fn remap_call(call: &MethodCallExpr) -> QuillResult<Expr> {
    let method = queryable_counterpart(call.method())?;
    Expr::call_method(method, call.type_args().to_vec(), call.args().to_vec())
}

/// Remap every in-memory call whose source is a translatable sequence.
///
/// Runs bottom-up, so a remapped call makes its parent call eligible as
/// well. Calls over genuinely in-memory sources are left alone.
pub fn remap_to_queryable(expr: &Expr) -> QuillResult<Expr> {
    EnumerableToQueryable.rewrite(expr)
}

struct EnumerableToQueryable;

impl ExprRewriter for EnumerableToQueryable {
    fn rewrite(&mut self, expr: &Expr) -> QuillResult<Expr> {
        let rewritten = rewrite_children(self, expr)?;
        match rewritten.kind() {
            ExprKind::Call(call)
                if call.declaring() == DeclaringType::Enumerable
                    && call.source().ty().sequence_kind() == Some(SequenceKind::Queryable) =>
            {
                remap_call(call)
            }
            _ => Ok(rewritten),
        }
    }
}
