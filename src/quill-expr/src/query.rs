//! Builders for operator calls.
//!
//! ```ignore
//! let query = queryable::where_(
//!     Expr::query_root("Customer"),
//!     lambda(&[("c", Type::entity("Customer"))], |p| {
//!         Expr::equal(Expr::member(p[0].clone(), "City", Type::String), Expr::constant("London"))
//!     })?,
//! )?;
//! ```

use quill_core::Type;

use common_error::QuillResult;

use crate::expr::{Expr, ParameterExpr};

/// Build a lambda with fresh parameters, passing their references to `body`.
pub fn lambda(
    params: &[(&str, Type)],
    body: impl FnOnce(&[Expr]) -> QuillResult<Expr>,
) -> QuillResult<Expr> {
    let params = params
        .iter()
        .map(|(name, ty)| ParameterExpr::new(*name, ty.clone()))
        .collect::<Vec<_>>();
    let refs = params.iter().map(Expr::parameter).collect::<Vec<_>>();
    let body = body(&refs)?;
    Ok(Expr::lambda(params, body))
}

macro_rules! sequence_builders {
    ($module:ident, $variant:ident, $doc:literal) => {
        #[doc = $doc]
        pub mod $module {
            use common_error::QuillResult;

            use crate::expr::Expr;
            use crate::method::{DeclaringType, SequenceOp};

            const DECLARING: DeclaringType = DeclaringType::$variant;

            /// `source.Where(predicate)`.
            pub fn where_(source: Expr, predicate: Expr) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::Where, vec![source, predicate])
            }

            /// `source.Select(selector)`.
            pub fn select(source: Expr, selector: Expr) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::Select, vec![source, selector])
            }

            /// `source.SelectMany(collection)`.
            pub fn select_many(source: Expr, collection: Expr) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::SelectMany, vec![source, collection])
            }

            /// `source.SelectMany(collection, result)`.
            pub fn select_many_with(
                source: Expr,
                collection: Expr,
                result: Expr,
            ) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::SelectMany, vec![source, collection, result])
            }

            /// `outer.Join(inner, outer_key, inner_key, result)`.
            pub fn join(
                outer: Expr,
                inner: Expr,
                outer_key: Expr,
                inner_key: Expr,
                result: Expr,
            ) -> QuillResult<Expr> {
                Expr::call(
                    DECLARING,
                    SequenceOp::Join,
                    vec![outer, inner, outer_key, inner_key, result],
                )
            }

            /// `outer.GroupJoin(inner, outer_key, inner_key, result)`.
            pub fn group_join(
                outer: Expr,
                inner: Expr,
                outer_key: Expr,
                inner_key: Expr,
                result: Expr,
            ) -> QuillResult<Expr> {
                Expr::call(
                    DECLARING,
                    SequenceOp::GroupJoin,
                    vec![outer, inner, outer_key, inner_key, result],
                )
            }

            /// `source.OrderBy(key)`.
            pub fn order_by(source: Expr, key: Expr) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::OrderBy, vec![source, key])
            }

            /// `source.OrderByDescending(key)`.
            pub fn order_by_descending(source: Expr, key: Expr) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::OrderByDescending, vec![source, key])
            }

            /// `source.DefaultIfEmpty()`.
            pub fn default_if_empty(source: Expr) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::DefaultIfEmpty, vec![source])
            }

            /// `source.Count()`.
            pub fn count(source: Expr) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::Count, vec![source])
            }

            /// `source.Count(predicate)`.
            pub fn count_where(source: Expr, predicate: Expr) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::Count, vec![source, predicate])
            }

            /// `source.Any()`.
            pub fn any(source: Expr) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::Any, vec![source])
            }

            /// `source.First()`.
            pub fn first(source: Expr) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::First, vec![source])
            }

            /// `source.FirstOrDefault()`.
            pub fn first_or_default(source: Expr) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::FirstOrDefault, vec![source])
            }

            /// `source.Take(count)`.
            pub fn take(source: Expr, count: i64) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::Take, vec![source, Expr::constant(count)])
            }

            /// `source.Skip(count)`.
            pub fn skip(source: Expr, count: i64) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::Skip, vec![source, Expr::constant(count)])
            }

            /// `source.Distinct()`.
            pub fn distinct(source: Expr) -> QuillResult<Expr> {
                Expr::call(DECLARING, SequenceOp::Distinct, vec![source])
            }
        }
    };
}

sequence_builders!(queryable, Queryable, "Translatable operators.");
sequence_builders!(enumerable, Enumerable, "In-memory operators.");

/// Entity-query operators.
pub mod entity_queryable {
    use common_error::QuillResult;

    use crate::expr::Expr;
    use crate::method::{DeclaringType, SequenceOp};

    const DECLARING: DeclaringType = DeclaringType::EntityQueryable;

    /// `outer.LeftJoin(inner, outer_key, inner_key, result)`.
    pub fn left_join(
        outer: Expr,
        inner: Expr,
        outer_key: Expr,
        inner_key: Expr,
        result: Expr,
    ) -> QuillResult<Expr> {
        Expr::call(
            DECLARING,
            SequenceOp::LeftJoin,
            vec![outer, inner, outer_key, inner_key, result],
        )
    }

    /// `source.AsNoTracking()`.
    pub fn as_no_tracking(source: Expr) -> QuillResult<Expr> {
        Expr::call(DECLARING, SequenceOp::AsNoTracking, vec![source])
    }

    /// `source.AsTracking()`.
    pub fn as_tracking(source: Expr) -> QuillResult<Expr> {
        Expr::call(DECLARING, SequenceOp::AsTracking, vec![source])
    }

    /// `source.TagWith(tag)`.
    pub fn tag_with(source: Expr, tag: &str) -> QuillResult<Expr> {
        Expr::call(DECLARING, SequenceOp::TagWith, vec![source, Expr::constant(tag)])
    }

    /// `source.IgnoreQueryFilters()`.
    pub fn ignore_query_filters(source: Expr) -> QuillResult<Expr> {
        Expr::call(DECLARING, SequenceOp::IgnoreQueryFilters, vec![source])
    }
}

/// `source.ToList()`, evaluated in memory.
pub fn to_list(source: Expr) -> QuillResult<Expr> {
    Expr::call(
        crate::method::DeclaringType::Enumerable,
        crate::method::SequenceOp::ToList,
        vec![source],
    )
}
