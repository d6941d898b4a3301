//! End-to-end simplification tests.
//!
//! Every rewritten tree is evaluated against the original over the same
//! in-memory rows.

use std::sync::Arc;

use common_error::{QuillError, QuillResult};
use proptest::prelude::*;
use quill_core::testing::Fixture;
use quill_core::{MetadataCatalog, RecordType, Type, Value};
use quill_expr::query::{enumerable, entity_queryable, lambda, queryable};
use quill_expr::{BinaryOp, DeclaringType, Expr, Interpreter, MethodCallExpr, SequenceOp};
use quill_optimizer::{OptimizerConfig, QueryCompilationContext, QueryOptimizer, simplify};

// ===== Helpers =====

fn context(fixture: &Fixture) -> QueryCompilationContext {
    let catalog: Arc<dyn MetadataCatalog> = Arc::new(fixture.model.clone());
    QueryCompilationContext::new(catalog)
}

fn simplify_on(fixture: &Fixture, query: &Expr) -> QuillResult<Expr> {
    let optimizer =
        QueryOptimizer::from_config(OptimizerConfig::default().with_validation(true));
    optimizer
        .optimize(query.clone(), &mut context(fixture))
        .map(|optimized| optimized.expr)
}

fn evaluate(fixture: &Fixture, expr: &Expr) -> Value {
    Interpreter::new(fixture).evaluate(expr).unwrap()
}

fn assert_equivalent(fixture: &Fixture, original: &Expr, simplified: &Expr) {
    assert_eq!(
        evaluate(fixture, original),
        evaluate(fixture, simplified),
        "simplified tree:\n{}",
        simplified.explain()
    );
}

fn contains_call(expr: &Expr, pred: &dyn Fn(&MethodCallExpr) -> bool) -> bool {
    expr.as_call().is_some_and(pred)
        || expr.children().into_iter().any(|child| contains_call(child, pred))
}

fn uses(expr: &Expr, op: SequenceOp) -> bool {
    contains_call(expr, &|call| call.op() == op)
}

fn top_call(expr: &Expr) -> &MethodCallExpr {
    expr.as_call().expect("expected a call at the root")
}

fn int64s(value: &Value) -> Vec<i64> {
    value
        .as_sequence()
        .unwrap()
        .iter()
        .map(|v| v.as_int64().unwrap())
        .collect()
}

// ===== Keyed fixture: Outer [1, 2, 3], Inner keyed [1, 1, 2] =====

fn outer() -> Type {
    Type::entity("Outer")
}

fn inner() -> Type {
    Type::entity("Inner")
}

fn group_join_over(source: Expr, key_member: &str) -> Expr {
    let element = source.ty().sequence_element().cloned().unwrap();
    let key_member = key_member.to_string();
    queryable::group_join(
        source,
        Expr::query_root("Inner"),
        lambda(&[("o", element.clone())], |p| {
            Ok(Expr::member(p[0].clone(), key_member, Type::Int64))
        })
        .unwrap(),
        lambda(&[("i", inner())], |p| {
            Ok(Expr::member(p[0].clone(), "Key", Type::Int64))
        })
        .unwrap(),
        lambda(&[("o", element), ("g", Type::enumerable(inner()))], |p| {
            Ok(p[1].clone())
        })
        .unwrap(),
    )
    .unwrap()
}

fn keyed_group_join() -> Expr {
    group_join_over(Expr::query_root("Outer"), "Id")
}

fn identity_collection(left: bool) -> Expr {
    lambda(&[("x", Type::enumerable(inner()))], |p| {
        if left {
            enumerable::default_if_empty(p[0].clone())
        } else {
            Ok(p[0].clone())
        }
    })
    .unwrap()
}

fn inner_id_result() -> Expr {
    lambda(&[("x", Type::enumerable(inner())), ("i", inner())], |p| {
        Ok(Expr::member(p[1].clone(), "Id", Type::Int64))
    })
    .unwrap()
}

#[test]
fn test_select_many_over_group_becomes_inner_join() {
    let fixture = Fixture::keyed();
    let query =
        queryable::select_many_with(keyed_group_join(), identity_collection(false), inner_id_result())
            .unwrap();

    let simplified = simplify_on(&fixture, &query).unwrap();

    assert!(top_call(&simplified).is(DeclaringType::Queryable, SequenceOp::Join));
    assert!(!uses(&simplified, SequenceOp::GroupJoin));
    assert_eq!(int64s(&evaluate(&fixture, &simplified)), [10, 11, 12]);
    assert_equivalent(&fixture, &query, &simplified);
}

#[test]
fn test_default_if_empty_selects_left_join() {
    let fixture = Fixture::keyed();
    let query = queryable::select_many_with(
        keyed_group_join(),
        identity_collection(true),
        lambda(&[("x", Type::enumerable(inner())), ("i", inner())], |p| {
            Ok(p[1].clone())
        })
        .unwrap(),
    )
    .unwrap();

    let simplified = simplify_on(&fixture, &query).unwrap();

    assert!(top_call(&simplified).is(DeclaringType::EntityQueryable, SequenceOp::LeftJoin));
    let rows = evaluate(&fixture, &simplified);
    let rows = rows.as_sequence().unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3], Value::Null);
    assert_equivalent(&fixture, &query, &simplified);
}

#[test]
fn test_group_consumed_by_count_resolves_to_join() {
    let fixture = Fixture::keyed();
    let pairs = queryable::select_many_with(
        keyed_group_join(),
        identity_collection(false),
        lambda(&[("x", Type::enumerable(inner())), ("i", inner())], |p| {
            Ok(p[0].clone())
        })
        .unwrap(),
    )
    .unwrap();
    let query = queryable::select(
        pairs,
        lambda(&[("x", Type::enumerable(inner()))], |p| {
            enumerable::count(p[0].clone())
        })
        .unwrap(),
    )
    .unwrap();

    let simplified = simplify_on(&fixture, &query).unwrap();

    let select = top_call(&simplified);
    assert!(select.is(DeclaringType::Queryable, SequenceOp::Select));
    assert!(select.source().as_call().unwrap().is(DeclaringType::Queryable, SequenceOp::Join));
    assert!(!uses(&simplified, SequenceOp::GroupJoin));
    assert!(!contains_call(&simplified, &|call| call.declaring() == DeclaringType::Enumerable));
    assert_eq!(int64s(&evaluate(&fixture, &simplified)), [2, 2, 1]);
    assert_equivalent(&fixture, &query, &simplified);
}

#[test]
fn test_where_then_select_over_group_is_remapped() {
    let fixture = Fixture::keyed();
    let pairs = queryable::select_many_with(
        keyed_group_join(),
        identity_collection(false),
        lambda(&[("x", Type::enumerable(inner())), ("i", inner())], |p| {
            Ok(p[0].clone())
        })
        .unwrap(),
    )
    .unwrap();
    let filtered = queryable::where_(
        pairs,
        lambda(&[("x", Type::enumerable(inner()))], |p| {
            Expr::binary(
                BinaryOp::GreaterThan,
                enumerable::count(p[0].clone())?,
                Expr::constant(1i64),
            )
        })
        .unwrap(),
    )
    .unwrap();
    let query = queryable::select(
        filtered,
        lambda(&[("x", Type::enumerable(inner()))], |p| {
            enumerable::count(p[0].clone())
        })
        .unwrap(),
    )
    .unwrap();

    let simplified = simplify_on(&fixture, &query).unwrap();

    assert!(!uses(&simplified, SequenceOp::GroupJoin));
    assert_eq!(int64s(&evaluate(&fixture, &simplified)), [2, 2]);
    assert_equivalent(&fixture, &query, &simplified);
}

#[test]
fn test_unremappable_consumer_keeps_group_join() {
    let fixture = Fixture::keyed();
    let pairs = queryable::select_many_with(
        keyed_group_join(),
        identity_collection(false),
        lambda(&[("x", Type::enumerable(inner())), ("i", inner())], |p| {
            Ok(p[0].clone())
        })
        .unwrap(),
    )
    .unwrap();
    let query = queryable::take(pairs, 2).unwrap();

    let simplified = simplify_on(&fixture, &query).unwrap();

    assert!(uses(&simplified, SequenceOp::GroupJoin));
    assert_equivalent(&fixture, &query, &simplified);
}

#[test]
fn test_correlated_two_argument_select_many_fails() {
    let fixture = Fixture::keyed();
    let query = queryable::select_many(
        keyed_group_join(),
        lambda(&[("x", Type::enumerable(inner()))], |p| {
            enumerable::take(p[0].clone(), 1)
        })
        .unwrap(),
    )
    .unwrap();

    let result = simplify_on(&fixture, &query);
    assert!(result.is_err_and(|err| err.is_unsupported()));
}

#[test]
fn test_index_taking_group_filter_fails() {
    let fixture = Fixture::keyed();
    let indexed = lambda(&[("i", inner()), ("n", Type::Int64)], |p| {
        Expr::binary(BinaryOp::LessThan, p[1].clone(), Expr::constant(1i64))
    })
    .unwrap();
    let collection = lambda(&[("x", Type::enumerable(inner()))], |p| {
        Expr::call(
            DeclaringType::Enumerable,
            SequenceOp::Where,
            vec![p[0].clone(), indexed.clone()],
        )
    })
    .unwrap();
    let query =
        queryable::select_many_with(keyed_group_join(), collection, inner_id_result()).unwrap();

    let result = simplify_on(&fixture, &query);
    assert!(matches!(result, Err(QuillError::NoEquivalentOperator(_))));
}

#[test]
fn test_projected_group_keeps_group_join() {
    let fixture = Fixture::keyed();
    let collection = lambda(&[("x", Type::enumerable(inner()))], |p| {
        enumerable::select(
            p[0].clone(),
            lambda(&[("i", inner())], |q| {
                Ok(Expr::member(q[0].clone(), "Id", Type::Int64))
            })?,
        )
    })
    .unwrap();
    let query = queryable::select_many_with(
        keyed_group_join(),
        collection,
        lambda(&[("x", Type::enumerable(inner())), ("id", Type::Int64)], |p| {
            Ok(p[1].clone())
        })
        .unwrap(),
    )
    .unwrap();

    let simplified = simplify_on(&fixture, &query).unwrap();

    assert!(uses(&simplified, SequenceOp::GroupJoin));
    assert_equivalent(&fixture, &query, &simplified);
}

#[test]
fn test_simplify_is_idempotent() {
    let fixture = Fixture::keyed();
    let query =
        queryable::select_many_with(keyed_group_join(), identity_collection(true), inner_id_result())
            .unwrap();

    let once = simplify(query, &mut context(&fixture)).unwrap();
    let twice = simplify(once.clone(), &mut context(&fixture)).unwrap();

    assert!(twice.ptr_eq(&once));
}

#[test]
fn test_disabled_flattening_keeps_group_join() {
    let fixture = Fixture::keyed();
    let config: OptimizerConfig =
        serde_json::from_str(r#"{ "flatten_group_joins": false }"#).unwrap();
    assert!(config.remove_null_checks);

    let query =
        queryable::select_many_with(keyed_group_join(), identity_collection(false), inner_id_result())
            .unwrap();
    let optimized = QueryOptimizer::from_config(config)
        .optimize(query, &mut context(&fixture))
        .unwrap();

    assert!(uses(&optimized.expr, SequenceOp::GroupJoin));
}

// ===== Customers and orders =====

fn customer() -> Type {
    Type::entity("Customer")
}

fn order() -> Type {
    Type::entity("Order")
}

fn customer_with_orders() -> RecordType {
    RecordType::new(
        "CustomerOrders",
        [("C", customer()), ("Os", Type::enumerable(order()))],
    )
}

/// `Customers.GroupJoin(Orders, c => c.Id, o => o.CustomerId, (c, os) => new { C = c, Os = os })`
fn customer_group_join() -> Expr {
    let record = customer_with_orders();
    queryable::group_join(
        Expr::query_root("Customer"),
        Expr::query_root("Order"),
        lambda(&[("c", customer())], |p| {
            Ok(Expr::member(p[0].clone(), "Id", Type::Int64))
        })
        .unwrap(),
        lambda(&[("o", order())], |p| {
            Ok(Expr::member(p[0].clone(), "CustomerId", Type::Int64))
        })
        .unwrap(),
        lambda(
            &[("c", customer()), ("os", Type::enumerable(order()))],
            |p| Expr::new_record(record, vec![p[0].clone(), p[1].clone()]),
        )
        .unwrap(),
    )
    .unwrap()
}

fn record_param() -> Type {
    Type::Record(customer_with_orders())
}

fn customer_name(x: &Expr) -> QuillResult<Expr> {
    Ok(Expr::member(Expr::field(x.clone(), "C")?, "Name", Type::String))
}

#[test]
fn test_filtered_group_joins_against_filtered_orders() {
    let fixture = Fixture::customer_orders();
    let collection = lambda(&[("x", record_param())], |p| {
        enumerable::where_(
            Expr::field(p[0].clone(), "Os")?,
            lambda(&[("o", order())], |q| {
                Expr::binary(
                    BinaryOp::GreaterThan,
                    Expr::member(q[0].clone(), "Amount", Type::Float64),
                    Expr::constant(7.0f64),
                )
            })?,
        )
    })
    .unwrap();
    let query = queryable::select_many_with(
        customer_group_join(),
        collection,
        lambda(&[("x", record_param()), ("o", order())], |p| {
            customer_name(&p[0])
        })
        .unwrap(),
    )
    .unwrap();

    let simplified = simplify_on(&fixture, &query).unwrap();

    let join = top_call(&simplified);
    assert!(join.is(DeclaringType::Queryable, SequenceOp::Join));
    assert!(join.args()[1].as_call().unwrap().is(DeclaringType::Queryable, SequenceOp::Where));
    assert_equivalent(&fixture, &query, &simplified);
}

#[test]
fn test_correlated_group_filter_becomes_select_many() {
    let fixture = Fixture::customer_orders();
    let collection = lambda(&[("x", record_param())], |p| {
        let x = p[0].clone();
        let filtered = enumerable::where_(
            Expr::field(x.clone(), "Os")?,
            lambda(&[("o", order())], |q| {
                Expr::binary(
                    BinaryOp::GreaterThan,
                    Expr::member(q[0].clone(), "Amount", Type::Float64),
                    Expr::member(Expr::field(x.clone(), "C")?, "Id", Type::Int64),
                )
            })?,
        )?;
        enumerable::default_if_empty(filtered)
    })
    .unwrap();
    let query = queryable::select_many_with(
        customer_group_join(),
        collection,
        lambda(&[("x", record_param()), ("o", order())], |p| {
            customer_name(&p[0])
        })
        .unwrap(),
    )
    .unwrap();

    let simplified = simplify_on(&fixture, &query).unwrap();

    let select_many = top_call(&simplified);
    assert!(select_many.is(DeclaringType::Queryable, SequenceOp::SelectMany));
    assert_eq!(select_many.args().len(), 3);
    assert!(!uses(&simplified, SequenceOp::GroupJoin));
    assert!(uses(&simplified, SequenceOp::DefaultIfEmpty));

    let names: Vec<_> = evaluate(&fixture, &simplified)
        .as_sequence()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["Alice", "Alice", "Bob", "Carol"]);
    assert_equivalent(&fixture, &query, &simplified);
}

#[test]
fn test_markers_are_lifted_before_flattening() {
    let fixture = Fixture::customer_orders();
    let query = queryable::select_many(
        customer_group_join(),
        lambda(&[("x", record_param())], |p| Expr::field(p[0].clone(), "Os")).unwrap(),
    )
    .unwrap();
    let query = entity_queryable::tag_with(query, "orders by customer").unwrap();
    let query = entity_queryable::as_no_tracking(query).unwrap();

    let mut ctx = context(&fixture);
    let optimized = QueryOptimizer::default().optimize(query, &mut ctx).unwrap();

    assert!(!optimized.metadata.tracking);
    assert_eq!(optimized.metadata.tags, ["orders by customer"]);
    assert!(top_call(&optimized.expr).is(DeclaringType::Queryable, SequenceOp::Join));
    assert_eq!(optimized.passes_applied, 2);
}

#[test]
fn test_unknown_entity_aborts() {
    let fixture = Fixture::keyed();
    let query = queryable::count(Expr::query_root("Missing")).unwrap();

    let result = simplify_on(&fixture, &query);
    assert!(matches!(result, Err(QuillError::MetadataError(_))));
}

// ===== Null keys: an outer row and an inner row keyed by null =====

fn keyed_with_nulls() -> Fixture {
    let mut fixture = Fixture::keyed();
    fixture.add_row("Outer", [("Id", Value::Null)]);
    fixture.add_row("Inner", [("Id", Value::Int64(13)), ("Key", Value::Null)]);
    fixture
}

#[test]
fn test_null_keys_never_join_in_resolved_group() {
    let fixture = keyed_with_nulls();
    let pairs = queryable::select_many_with(
        keyed_group_join(),
        identity_collection(true),
        lambda(&[("x", Type::enumerable(inner())), ("i", inner())], |p| {
            Ok(p[0].clone())
        })
        .unwrap(),
    )
    .unwrap();
    let query = queryable::select(
        pairs,
        lambda(&[("x", Type::enumerable(inner()))], |p| {
            enumerable::count(p[0].clone())
        })
        .unwrap(),
    )
    .unwrap();

    let simplified = simplify_on(&fixture, &query).unwrap();

    assert!(!uses(&simplified, SequenceOp::GroupJoin));
    assert_eq!(int64s(&evaluate(&fixture, &simplified)), [2, 2, 1, 0, 0]);
    assert_equivalent(&fixture, &query, &simplified);
}

#[test]
fn test_null_keys_never_join_in_correlated_group() {
    let fixture = keyed_with_nulls();
    let query = queryable::select_many_with(
        keyed_group_join(),
        lambda(&[("x", Type::enumerable(inner()))], |p| {
            enumerable::take(p[0].clone(), 5)
        })
        .unwrap(),
        inner_id_result(),
    )
    .unwrap();

    let simplified = simplify_on(&fixture, &query).unwrap();

    assert!(top_call(&simplified).is(DeclaringType::Queryable, SequenceOp::SelectMany));
    assert!(!uses(&simplified, SequenceOp::GroupJoin));
    assert_eq!(int64s(&evaluate(&fixture, &simplified)), [10, 11, 12]);
    assert_equivalent(&fixture, &query, &simplified);
}

// ===== Property tests =====

/// A chain of grouped joins, each flattened by a two-argument `SelectMany`
/// whose collection selector optionally applies `DefaultIfEmpty`.
fn chained(lefts: &[bool]) -> Expr {
    let mut query = Expr::query_root("Outer");
    let mut key = "Id";
    for &left in lefts {
        query = queryable::select_many(
            group_join_over(query, key),
            identity_collection(left),
        )
        .unwrap();
        key = "Key";
    }
    query
}

proptest! {
    #[test]
    fn prop_chained_group_joins_flatten(lefts in prop::collection::vec(any::<bool>(), 1..4)) {
        let fixture = Fixture::keyed();
        let query = chained(&lefts);

        let simplified = simplify_on(&fixture, &query).unwrap();

        prop_assert!(!uses(&simplified, SequenceOp::GroupJoin));
        prop_assert_eq!(evaluate(&fixture, &query), evaluate(&fixture, &simplified));
    }

    #[test]
    fn prop_uncorrelated_filters_preserve_rows(threshold in 9i64..14, left in any::<bool>()) {
        let fixture = Fixture::keyed();
        let collection = lambda(&[("x", Type::enumerable(inner()))], |p| {
            let filtered = enumerable::where_(
                p[0].clone(),
                lambda(&[("i", inner())], |q| {
                    Expr::binary(
                        BinaryOp::LessThan,
                        Expr::member(q[0].clone(), "Id", Type::Int64),
                        Expr::constant(threshold),
                    )
                })?,
            )?;
            if left { enumerable::default_if_empty(filtered) } else { Ok(filtered) }
        })
        .unwrap();
        let result = lambda(&[("x", Type::enumerable(inner())), ("i", inner())], |p| {
            Ok(p[1].clone())
        })
        .unwrap();
        let query = queryable::select_many_with(keyed_group_join(), collection, result).unwrap();

        let simplified = simplify_on(&fixture, &query).unwrap();

        prop_assert!(!uses(&simplified, SequenceOp::GroupJoin));
        prop_assert_eq!(evaluate(&fixture, &query), evaluate(&fixture, &simplified));
    }
}
