//! Metadata extraction pass.
//!
//! Binds every query root to its entity metadata and lifts query-level
//! marker operators (`AsNoTracking`, `AsTracking`, `TagWith`,
//! `IgnoreQueryFilters`) into the compilation context.

use common_error::{QuillError, QuillResult};
use log::debug;
use quill_core::Value;
use quill_expr::{DeclaringType, Expr, ExprKind, ExprRewriter, SequenceOp, rewrite_children};

use super::pass::{QueryPass, Transformed};
use crate::context::QueryCompilationContext;

/// Resolves query roots against the metadata catalog.
pub struct MetadataExtraction;

impl QueryPass for MetadataExtraction {
    fn name(&self) -> &'static str {
        "MetadataExtraction"
    }

    fn description(&self) -> &'static str {
        "Bind query roots to entity metadata and lift query-level markers"
    }

    fn apply(&self, expr: Expr, ctx: &mut QueryCompilationContext) -> QuillResult<Transformed> {
        let rewritten = MetadataExtractor { ctx }.rewrite(&expr)?;
        Ok(Transformed::compare(&expr, rewritten))
    }
}

struct MetadataExtractor<'a> {
    ctx: &'a mut QueryCompilationContext,
}

impl ExprRewriter for MetadataExtractor<'_> {
    fn rewrite(&mut self, expr: &Expr) -> QuillResult<Expr> {
        match expr.kind() {
            ExprKind::QueryRoot { entity } => {
                let entity_type = self.ctx.catalog().entity_type(entity)?;
                debug!("Bound query root '{entity}'");
                Ok(Expr::entity_queryable(entity_type))
            }
            ExprKind::Call(call)
                if call.declaring() == DeclaringType::EntityQueryable && is_marker(call.op()) =>
            {
                let source = self.rewrite(call.source())?;
                let metadata = self.ctx.metadata_mut();
                match call.op() {
                    SequenceOp::AsNoTracking => metadata.tracking = false,
                    SequenceOp::AsTracking => metadata.tracking = true,
                    SequenceOp::IgnoreQueryFilters => metadata.ignore_query_filters = true,
                    _ => metadata.tags.push(constant_tag(&call.args()[1])?),
                }
                debug!("Lifted query marker {}", call.op());
                Ok(source)
            }
            _ => rewrite_children(self, expr),
        }
    }
}

const fn is_marker(op: SequenceOp) -> bool {
    matches!(
        op,
        SequenceOp::AsNoTracking
            | SequenceOp::AsTracking
            | SequenceOp::TagWith
            | SequenceOp::IgnoreQueryFilters
    )
}

fn constant_tag(arg: &Expr) -> QuillResult<String> {
    match arg.kind() {
        ExprKind::Constant {
            value: Value::String(tag),
            ..
        } => Ok(tag.clone()),
        _ => Err(QuillError::invalid_parameter(format!(
            "TagWith expects a constant string, got {arg}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quill_core::testing::Fixture;
    use quill_core::{MetadataCatalog, Type};
    use quill_expr::query::{entity_queryable, lambda, queryable};

    use super::*;

    fn context() -> QueryCompilationContext {
        let catalog: Arc<dyn MetadataCatalog> = Arc::new(Fixture::customer_orders().model);
        QueryCompilationContext::new(catalog)
    }

    #[test]
    fn test_binds_roots() {
        let mut ctx = context();
        let query = queryable::select(
            Expr::query_root("Customer"),
            lambda(&[("c", Type::entity("Customer"))], |p| {
                Ok(Expr::member(p[0].clone(), "Name", Type::String))
            })
            .unwrap(),
        )
        .unwrap();

        let result = MetadataExtraction.apply(query, &mut ctx).unwrap();
        assert!(result.changed);
        let source = result.expr.as_call().unwrap().source().clone();
        assert!(matches!(source.kind(), ExprKind::EntityQueryable(e) if e.name == "Customer"));
    }

    #[test]
    fn test_unknown_root() {
        let mut ctx = context();
        let result = MetadataExtraction.apply(Expr::query_root("Invoice"), &mut ctx);
        assert!(matches!(result, Err(QuillError::MetadataError(_))));
    }

    #[test]
    fn test_lifts_markers() {
        let mut ctx = context();
        let query = entity_queryable::ignore_query_filters(
            entity_queryable::tag_with(
                entity_queryable::tag_with(
                    entity_queryable::as_no_tracking(Expr::query_root("Order")).unwrap(),
                    "first",
                )
                .unwrap(),
                "second",
            )
            .unwrap(),
        )
        .unwrap();

        let result = MetadataExtraction.apply(query, &mut ctx).unwrap();
        assert!(matches!(result.expr.kind(), ExprKind::EntityQueryable(_)));

        let metadata = ctx.metadata();
        assert!(!metadata.tracking);
        assert!(metadata.ignore_query_filters);
        assert_eq!(metadata.tags, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_outermost_tracking_marker_wins() {
        let mut ctx = context();
        let query = entity_queryable::as_tracking(
            entity_queryable::as_no_tracking(Expr::query_root("Order")).unwrap(),
        )
        .unwrap();

        MetadataExtraction.apply(query, &mut ctx).unwrap();
        assert!(ctx.metadata().tracking);
    }

    #[test]
    fn test_resolved_tree_is_unchanged() {
        let mut ctx = context();
        let resolved = MetadataExtraction
            .apply(Expr::query_root("Order"), &mut ctx)
            .unwrap()
            .expr;

        let again = MetadataExtraction.apply(resolved.clone(), &mut ctx).unwrap();
        assert!(!again.changed);
        assert!(again.expr.ptr_eq(&resolved));
    }
}
