//! Grouped-join flattening pass.
//!
//! Rewrites `outer.GroupJoin(inner, ..).SelectMany(..)` into a flat `Join`,
//! a `LeftJoin` when the group is wrapped in `DefaultIfEmpty`, or a
//! correlated `SelectMany` over `outer` when the collection selector
//! depends on more than the group. Shapes that cannot be rewritten safely
//! keep the grouped join.
//!
//! When the final result still needs the whole group, the flat join yields
//! transparent identifiers and a pending [`FlattenedGroupJoinExpr`] carries
//! the substitutions needed to remap the `Where`, `OrderBy` and `Select`
//! operators above it. `Select` completes the rewrite; any other consumer
//! falls back to the grouped form.

use common_error::{QuillError, QuillResult};
use log::debug;
use quill_core::Type;
use quill_expr::query::queryable;
use quill_expr::{
    BinaryOp, DeclaringType, Expr, ExprKind, ExprRewriter, FlattenedGroupJoinExpr, LambdaExpr,
    MethodCallExpr, ParameterExpr, SequenceOp, Substitution, replace, rewrite_children,
};

use super::pass::{QueryPass, Transformed};
use crate::context::QueryCompilationContext;
use crate::correlation::{is_correlated, references_group};
use crate::remapping::remap_to_queryable;

/// Flattens grouped joins consumed by `SelectMany`.
pub struct GroupJoinFlattening;

impl QueryPass for GroupJoinFlattening {
    fn name(&self) -> &'static str {
        "GroupJoinFlattening"
    }

    fn description(&self) -> &'static str {
        "Rewrite GroupJoin followed by SelectMany into Join, LeftJoin or a correlated SelectMany"
    }

    fn apply(&self, expr: Expr, _ctx: &mut QueryCompilationContext) -> QuillResult<Transformed> {
        let rewritten = Flattener.rewrite(&expr)?;
        Ok(Transformed::compare(&expr, rewritten))
    }
}

struct Flattener;

impl ExprRewriter for Flattener {
    fn rewrite(&mut self, expr: &Expr) -> QuillResult<Expr> {
        let visited = self.visit(expr)?;
        Ok(settle(visited))
    }
}

impl Flattener {
    /// Rewrite `expr`. Unlike [`ExprRewriter::rewrite`], the result may be a
    /// pending flattened group join.
    fn visit(&mut self, expr: &Expr) -> QuillResult<Expr> {
        let Some(call) = expr.as_call() else {
            return rewrite_children(self, expr);
        };
        if call.declaring() != DeclaringType::Queryable || call.method().is_indexed() {
            return rewrite_children(self, expr);
        }

        match call.op() {
            SequenceOp::SelectMany => self.visit_select_many(expr, call),
            SequenceOp::Where
            | SequenceOp::OrderBy
            | SequenceOp::OrderByDescending
            | SequenceOp::Select => self.visit_continuation(expr, call),
            _ => rewrite_children(self, expr),
        }
    }

    /// Rebuild `call` over `source`, rewriting its remaining arguments.
    fn rebuild(&mut self, expr: &Expr, call: &MethodCallExpr, source: Expr) -> QuillResult<Expr> {
        let mut changed = !source.ptr_eq(call.source());
        let mut args = Vec::with_capacity(call.args().len());
        args.push(source);
        for arg in &call.args()[1..] {
            let rewritten = self.rewrite(arg)?;
            changed |= !rewritten.ptr_eq(arg);
            args.push(rewritten);
        }

        if changed {
            Expr::call_method(call.method(), call.type_args().to_vec(), args)
        } else {
            Ok(expr.clone())
        }
    }

    fn visit_select_many(&mut self, expr: &Expr, call: &MethodCallExpr) -> QuillResult<Expr> {
        let source = settle(self.visit(call.source())?);
        let grouped = self.rebuild(expr, call, source)?;
        let Some(select_many) = grouped.as_call() else {
            return Ok(grouped);
        };

        match flatten(select_many, &grouped)? {
            Some(flat) => Ok(flat),
            None => Ok(grouped),
        }
    }

    fn visit_continuation(&mut self, expr: &Expr, call: &MethodCallExpr) -> QuillResult<Expr> {
        let source = self.visit(call.source())?;
        let pending = match source.kind() {
            ExprKind::FlattenedGroupJoin(pending) => pending,
            _ => return self.rebuild(expr, call, source),
        };

        let grouped = self.rebuild(expr, call, pending.grouped().clone())?;
        let lambda = grouped
            .as_call()
            .and_then(|c| c.lambda(1))
            .ok_or_else(|| QuillError::internal(format!("{} without a lambda", call.op())))?;

        let remapped = remap_lambda(pending, lambda)?;
        let flat = Expr::call(
            DeclaringType::Queryable,
            call.op(),
            vec![pending.source().clone(), remapped],
        )?;

        if call.op() == SequenceOp::Select {
            debug!("Completed flattened group join with Select");
            return Ok(flat);
        }
        debug!("Attached {} to flattened group join", call.op());
        Ok(Expr::flattened_group_join(pending.advance(flat, grouped)))
    }
}

/// Replace a pending flattened group join with its grouped form.
fn settle(expr: Expr) -> Expr {
    if let ExprKind::FlattenedGroupJoin(pending) = expr.kind() {
        debug!("Kept grouped join: its consumer cannot be remapped");
        return pending.grouped().clone();
    }
    expr
}

/// Re-express a lambda over the grouped result as a lambda over the
/// transparent identifier produced by the flat join.
fn remap_lambda(pending: &FlattenedGroupJoinExpr, lambda: &LambdaExpr) -> QuillResult<Expr> {
    let param = lambda
        .param(0)
        .ok_or_else(|| QuillError::internal("continuation lambda without a parameter"))?;
    let group = pending.group_parameter();

    let body = replace(
        lambda.body(),
        &Expr::parameter(param),
        pending.result_selector_body(),
    )?;
    let body = replace(&body, &Expr::parameter(group), pending.group_source())?;
    let body = remap_to_queryable(&body)?;

    // The substitution above removes every group reference, so this fires
    // only when the per-row group source itself mentions the group.
    if references_group(&body, group) {
        return Err(QuillError::invariant(format!(
            "group parameter '{}' is still referenced by {body}",
            group.name()
        )));
    }

    let body = pending.replacements().apply(&body)?;
    Ok(Expr::lambda(
        vec![pending.transparent_identifier_parameter().clone()],
        body,
    ))
}

/// The pieces of a `GroupJoin` call.
struct GroupJoinParts<'a> {
    outer: &'a Expr,
    inner: &'a Expr,
    outer_key: &'a Expr,
    inner_key: &'a Expr,
    outer_param: &'a ParameterExpr,
    group_param: &'a ParameterExpr,
    result_body: &'a Expr,
}

impl<'a> GroupJoinParts<'a> {
    fn new(call: &'a MethodCallExpr) -> Option<Self> {
        let result = call.lambda(4)?;
        Some(Self {
            outer: &call.args()[0],
            inner: &call.args()[1],
            outer_key: &call.args()[2],
            inner_key: &call.args()[3],
            outer_param: result.param(0)?,
            group_param: result.param(1)?,
            result_body: result.body(),
        })
    }

    fn inner_element(&self) -> Option<Type> {
        self.inner.ty().sequence_element().cloned()
    }

    /// The group of one outer row:
    /// `inner.Where(i => outerKey(outer) != null && outerKey(outer) == innerKey(i))`.
    ///
    /// `==` treats two nulls as equal; a grouped join never matches a null key.
    fn group_of(&self, outer: &Expr) -> QuillResult<Expr> {
        let (Some(outer_key), Some(inner_key)) =
            (self.outer_key.as_lambda(), self.inner_key.as_lambda())
        else {
            return Err(QuillError::internal("group join keys must be lambdas"));
        };
        let (Some(outer_key_param), Some(inner_key_param)) =
            (outer_key.param(0), inner_key.param(0))
        else {
            return Err(QuillError::internal("group join keys must take one parameter"));
        };

        let i = ParameterExpr::new("i", inner_key_param.ty().clone());
        let outer_value = replace(outer_key.body(), &Expr::parameter(outer_key_param), outer)?;
        let inner_value = replace(
            inner_key.body(),
            &Expr::parameter(inner_key_param),
            &Expr::parameter(&i),
        )?;
        let matches = Expr::binary(
            BinaryOp::AndAlso,
            Expr::not_equal(outer_value.clone(), Expr::null())?,
            Expr::equal(outer_value, inner_value)?,
        )?;
        queryable::where_(self.inner.clone(), Expr::lambda(vec![i], matches))
    }

    /// `outer.Join(inner, ..)` or `outer.LeftJoin(inner, ..)` on the original keys.
    fn join(&self, inner: Expr, result: Expr, left: bool) -> QuillResult<Expr> {
        let (declaring, op) = if left {
            (DeclaringType::EntityQueryable, SequenceOp::LeftJoin)
        } else {
            (DeclaringType::Queryable, SequenceOp::Join)
        };
        debug!("Flattened group join into {op}");
        Expr::call(
            declaring,
            op,
            vec![
                self.outer.clone(),
                inner,
                self.outer_key.clone(),
                self.inner_key.clone(),
                result,
            ],
        )
    }
}

/// Try to flatten one `SelectMany` call. `None` keeps the grouped form.
fn flatten(select_many: &MethodCallExpr, grouped: &Expr) -> QuillResult<Option<Expr>> {
    let Some(group_join) = select_many
        .source()
        .as_call()
        .filter(|c| c.is(DeclaringType::Queryable, SequenceOp::GroupJoin))
    else {
        return Ok(None);
    };
    let (Some(parts), Some(collection_selector)) =
        (GroupJoinParts::new(group_join), select_many.lambda(1))
    else {
        return Ok(None);
    };

    match select_many.lambda(2) {
        Some(result_selector) => {
            flatten_with_result_selector(&parts, collection_selector, result_selector, grouped)
        }
        None => flatten_without_result_selector(&parts, collection_selector),
    }
}

/// The group-access expression a collection selector reads, with any
/// outer `DefaultIfEmpty` removed and reported.
fn collection_of(
    parts: &GroupJoinParts<'_>,
    collection_selector: &LambdaExpr,
) -> QuillResult<Option<(Expr, bool)>> {
    let Some(param) = collection_selector.param(0) else {
        return Ok(None);
    };
    let collection = replace(
        collection_selector.body(),
        &Expr::parameter(param),
        parts.result_body,
    )?;

    Ok(Some(match collection.as_call() {
        Some(call) if call.op() == SequenceOp::DefaultIfEmpty && call.args().len() == 1 => {
            (call.source().clone(), true)
        }
        _ => (collection, false),
    }))
}

/// Apply an uncorrelated group expression to the whole inner sequence.
///
/// Returns `None` when the expression changes the element type, since the
/// flat join keys apply to inner elements.
fn derive_inner(parts: &GroupJoinParts<'_>, collection: &Expr) -> QuillResult<Option<Expr>> {
    let derived = replace(collection, &Expr::parameter(parts.group_param), parts.inner)?;
    let derived = remap_to_queryable(&derived)?;
    if derived.ty().sequence_element().cloned() != parts.inner_element() {
        debug!("Kept grouped join: collection selector projects the group");
        return Ok(None);
    }
    Ok(Some(derived))
}

fn flatten_with_result_selector(
    parts: &GroupJoinParts<'_>,
    collection_selector: &LambdaExpr,
    result_selector: &LambdaExpr,
    grouped: &Expr,
) -> QuillResult<Option<Expr>> {
    let Some((collection, left)) = collection_of(parts, collection_selector)? else {
        return Ok(None);
    };
    let (Some(result_outer), Some(result_inner)) =
        (result_selector.param(0), result_selector.param(1))
    else {
        return Ok(None);
    };
    let result_body = replace(
        result_selector.body(),
        &Expr::parameter(result_outer),
        parts.result_body,
    )?;

    if is_correlated(&collection, parts.group_param) {
        return correlated_select_many(parts, &collection, left, result_inner, result_body);
    }

    let Some(inner) = derive_inner(parts, &collection)? else {
        return Ok(None);
    };

    if references_group(&result_body, parts.group_param) {
        return pending(parts, inner, result_inner, result_body, left, grouped).map(Some);
    }

    let result = Expr::lambda(
        vec![parts.outer_param.clone(), result_inner.clone()],
        result_body,
    );
    parts.join(inner, result, left).map(Some)
}

fn flatten_without_result_selector(
    parts: &GroupJoinParts<'_>,
    collection_selector: &LambdaExpr,
) -> QuillResult<Option<Expr>> {
    let Some((collection, left)) = collection_of(parts, collection_selector)? else {
        return Ok(None);
    };

    if is_correlated(&collection, parts.group_param) {
        return Err(QuillError::unsupported(format!(
            "SelectMany without a result selector over a correlated group: {collection}"
        )));
    }

    let Some(inner) = derive_inner(parts, &collection)? else {
        return Ok(None);
    };
    let Some(element) = inner.ty().sequence_element().cloned() else {
        return Ok(None);
    };

    let i = ParameterExpr::new("i", element);
    let result = Expr::lambda(
        vec![parts.outer_param.clone(), i.clone()],
        Expr::parameter(&i),
    );
    parts.join(inner, result, left).map(Some)
}

/// `outer.SelectMany(o => collection[g := group of o], (o, i) => result)`.
fn correlated_select_many(
    parts: &GroupJoinParts<'_>,
    collection: &Expr,
    left: bool,
    result_inner: &ParameterExpr,
    result_body: Expr,
) -> QuillResult<Option<Expr>> {
    if references_group(&result_body, parts.group_param) {
        debug!("Kept grouped join: correlated collection and the result uses the group");
        return Ok(None);
    }

    let group = parts.group_of(&Expr::parameter(parts.outer_param))?;
    let mut derived = remap_to_queryable(&replace(
        collection,
        &Expr::parameter(parts.group_param),
        &group,
    )?)?;
    if left {
        derived = queryable::default_if_empty(derived)?;
    }

    debug!("Flattened correlated group join into SelectMany");
    queryable::select_many_with(
        parts.outer.clone(),
        Expr::lambda(vec![parts.outer_param.clone()], derived),
        Expr::lambda(
            vec![parts.outer_param.clone(), result_inner.clone()],
            result_body,
        ),
    )
    .map(Some)
}

/// Emit a join producing transparent identifiers and leave the rest of the
/// rewrite to the operators above.
fn pending(
    parts: &GroupJoinParts<'_>,
    inner: Expr,
    result_inner: &ParameterExpr,
    result_body: Expr,
    left: bool,
    grouped: &Expr,
) -> QuillResult<Expr> {
    let outer_ref = Expr::parameter(parts.outer_param);
    let inner_ref = Expr::parameter(result_inner);

    let pair = Expr::lambda(
        vec![parts.outer_param.clone(), result_inner.clone()],
        Expr::transparent_identifier(outer_ref.clone(), inner_ref.clone()),
    );
    let source = parts.join(inner, pair, left)?;

    let ti = ParameterExpr::new(
        "ti",
        Type::transparent_identifier(parts.outer_param.ty().clone(), result_inner.ty().clone()),
    );
    let ti_ref = Expr::parameter(&ti);
    let replacements = Substitution::new()
        .with(outer_ref.clone(), Expr::field(ti_ref.clone(), "Outer")?)
        .with(inner_ref, Expr::field(ti_ref, "Inner")?);
    let group_source = parts.group_of(&outer_ref)?;

    debug!("Group join pending: the result selector still uses the group");
    Ok(Expr::flattened_group_join(FlattenedGroupJoinExpr::new(
        source,
        grouped.clone(),
        result_body,
        parts.group_param.clone(),
        group_source,
        replacements,
        ti,
    )))
}
