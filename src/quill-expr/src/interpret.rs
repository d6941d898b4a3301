//! In-memory evaluation of expression trees.
//!
//! The interpreter gives every tree a reference meaning: a rewrite is
//! correct when the rewritten tree evaluates to the same value as the
//! original over the same rows.

use std::collections::{BTreeMap, HashMap};

use quill_core::testing::Fixture;
use quill_core::Value;

use common_error::{QuillError, QuillResult, eval_err};

use crate::expr::{BinaryOp, Expr, ExprKind, LambdaExpr, MethodCallExpr, ParamId};
use crate::method::SequenceOp;

/// Rows stored per entity.
pub trait DataSource {
    /// Rows of an entity, or `None` if the entity is unknown.
    fn rows(&self, entity: &str) -> Option<&[Value]>;
}

impl DataSource for BTreeMap<String, Vec<Value>> {
    fn rows(&self, entity: &str) -> Option<&[Value]> {
        self.get(entity).map(Vec::as_slice)
    }
}

impl DataSource for Fixture {
    fn rows(&self, entity: &str) -> Option<&[Value]> {
        self.rows.get(entity).map(Vec::as_slice)
    }
}

type Env = HashMap<ParamId, Value>;

/// Tree-walking evaluator over a [`DataSource`].
pub struct Interpreter<'a> {
    source: &'a dyn DataSource,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter reading rows from `source`.
    pub fn new(source: &'a dyn DataSource) -> Self {
        Self { source }
    }

    /// Evaluate a closed expression.
    pub fn evaluate(&self, expr: &Expr) -> QuillResult<Value> {
        self.eval(expr, &Env::new())
    }

    fn eval(&self, expr: &Expr, env: &Env) -> QuillResult<Value> {
        match expr.kind() {
            ExprKind::Constant { value, .. } => Ok(value.clone()),
            ExprKind::Parameter(p) => env.get(&p.id()).cloned().ok_or_else(|| {
                QuillError::evaluation(format!("parameter '{}' is not bound", p.name()))
            }),
            ExprKind::Member { expr: target, member, .. } => match self.eval(target, env)? {
                Value::Null => Ok(Value::Null),
                value @ Value::Record(_) => value.field(member).cloned().ok_or_else(|| {
                    QuillError::evaluation(format!("{} has no member '{member}'", value.type_name()))
                }),
                other => eval_err!("cannot read '{member}' of {}", other.type_name()),
            },
            ExprKind::Call(call) => self.eval_call(call, env),
            ExprKind::Lambda(_) | ExprKind::Quote(_) => {
                eval_err!("a lambda cannot be evaluated as a value")
            }
            ExprKind::Binary { op, left, right, .. } => self.eval_binary(*op, left, right, env),
            ExprKind::Not(operand) => match self.eval(operand, env)? {
                Value::Null => Ok(Value::Null),
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => eval_err!("cannot negate {}", other.type_name()),
            },
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => {
                if truthy(&self.eval(test, env)?)? {
                    self.eval(if_true, env)
                } else {
                    self.eval(if_false, env)
                }
            }
            ExprKind::New { record, args } => {
                let mut fields = Vec::with_capacity(args.len());
                for ((name, _), arg) in record.fields.iter().zip(args) {
                    fields.push((name.clone(), self.eval(arg, env)?));
                }
                Ok(Value::record(record.name.clone(), fields))
            }
            ExprKind::QueryRoot { entity } => self.entity_rows(entity),
            ExprKind::EntityQueryable(entity_type) => self.entity_rows(&entity_type.name),
            ExprKind::ProjectionBinding(_)
            | ExprKind::EntityShaper(_)
            | ExprKind::FlattenedGroupJoin(_) => {
                eval_err!("{expr} is not evaluable in memory")
            }
        }
    }

    fn entity_rows(&self, entity: &str) -> QuillResult<Value> {
        self.source
            .rows(entity)
            .map(|rows| Value::sequence(rows.iter().cloned()))
            .ok_or_else(|| QuillError::evaluation(format!("no rows for entity '{entity}'")))
    }

    fn apply(&self, lambda: &LambdaExpr, env: &Env, args: &[Value]) -> QuillResult<Value> {
        if lambda.params().len() != args.len() {
            eval_err!(
                "lambda takes {} arguments, got {}",
                lambda.params().len(),
                args.len()
            );
        }
        let mut scope = env.clone();
        for (param, arg) in lambda.params().iter().zip(args) {
            scope.insert(param.id(), arg.clone());
        }
        self.eval(lambda.body(), &scope)
    }

    fn sequence(&self, expr: &Expr, env: &Env) -> QuillResult<Vec<Value>> {
        match self.eval(expr, env)? {
            Value::Sequence(items) => Ok(items.as_ref().clone()),
            other => eval_err!("expected a sequence, got {}", other.type_name()),
        }
    }

    fn eval_call(&self, call: &MethodCallExpr, env: &Env) -> QuillResult<Value> {
        let args = call.args();
        let lambda = |position: usize| {
            call.lambda(position).ok_or_else(|| {
                QuillError::evaluation(format!("argument {position} of {} is not a lambda", call.method()))
            })
        };
        let source = self.sequence(call.source(), env)?;
        let indexed = call.method().is_indexed();

        let selected = |lambda: &LambdaExpr, item: &Value, index: usize| {
            if indexed {
                self.apply(lambda, env, &[item.clone(), Value::Int64(index as i64)])
            } else {
                self.apply(lambda, env, std::slice::from_ref(item))
            }
        };

        let result = match call.op() {
            SequenceOp::Where => {
                let predicate = lambda(1)?;
                let mut kept = Vec::new();
                for (index, item) in source.into_iter().enumerate() {
                    if truthy(&selected(predicate, &item, index)?)? {
                        kept.push(item);
                    }
                }
                Value::sequence(kept)
            }
            SequenceOp::Select => {
                let selector = lambda(1)?;
                let mut mapped = Vec::with_capacity(source.len());
                for (index, item) in source.iter().enumerate() {
                    mapped.push(selected(selector, item, index)?);
                }
                Value::sequence(mapped)
            }
            SequenceOp::SelectMany => {
                let collection = lambda(1)?;
                let result_selector = if args.len() == 3 { Some(lambda(2)?) } else { None };
                let mut flattened = Vec::new();
                for (index, item) in source.iter().enumerate() {
                    let inner = match selected(collection, item, index)? {
                        Value::Sequence(items) => items,
                        other => eval_err!("SelectMany collection is {}", other.type_name()),
                    };
                    for element in inner.iter() {
                        flattened.push(match result_selector {
                            Some(rs) => self.apply(rs, env, &[item.clone(), element.clone()])?,
                            None => element.clone(),
                        });
                    }
                }
                Value::sequence(flattened)
            }
            SequenceOp::Join | SequenceOp::LeftJoin | SequenceOp::GroupJoin => {
                let inner = self.sequence(&args[1], env)?;
                let (outer_key, inner_key, result_selector) = (lambda(2)?, lambda(3)?, lambda(4)?);

                let mut inner_keys = Vec::with_capacity(inner.len());
                for item in &inner {
                    inner_keys.push(self.apply(inner_key, env, std::slice::from_ref(item))?);
                }

                let mut joined = Vec::new();
                for item in &source {
                    let key = self.apply(outer_key, env, std::slice::from_ref(item))?;
                    let matches = inner
                        .iter()
                        .zip(&inner_keys)
                        .filter(|(_, k)| keys_match(&key, k))
                        .map(|(i, _)| i.clone())
                        .collect::<Vec<_>>();

                    match call.op() {
                        SequenceOp::GroupJoin => joined.push(self.apply(
                            result_selector,
                            env,
                            &[item.clone(), Value::sequence(matches)],
                        )?),
                        SequenceOp::LeftJoin if matches.is_empty() => joined.push(self.apply(
                            result_selector,
                            env,
                            &[item.clone(), Value::Null],
                        )?),
                        _ => {
                            for m in matches {
                                joined.push(self.apply(result_selector, env, &[item.clone(), m])?);
                            }
                        }
                    }
                }
                Value::sequence(joined)
            }
            SequenceOp::OrderBy | SequenceOp::OrderByDescending => {
                let key = lambda(1)?;
                let mut keyed = Vec::with_capacity(source.len());
                for item in source {
                    keyed.push((self.apply(key, env, std::slice::from_ref(&item))?, item));
                }
                if call.op() == SequenceOp::OrderBy {
                    keyed.sort_by(|(a, _), (b, _)| a.total_cmp(b));
                } else {
                    keyed.sort_by(|(a, _), (b, _)| b.total_cmp(a));
                }
                Value::sequence(keyed.into_iter().map(|(_, item)| item))
            }
            SequenceOp::DefaultIfEmpty => {
                if source.is_empty() {
                    Value::sequence([Value::Null])
                } else {
                    Value::sequence(source)
                }
            }
            SequenceOp::Count | SequenceOp::Any | SequenceOp::First | SequenceOp::FirstOrDefault => {
                let filtered = match call.lambda(1) {
                    Some(predicate) => {
                        let mut kept = Vec::new();
                        for item in source {
                            if truthy(&self.apply(predicate, env, std::slice::from_ref(&item))?)? {
                                kept.push(item);
                            }
                        }
                        kept
                    }
                    None => source,
                };
                match call.op() {
                    SequenceOp::Count => Value::Int64(filtered.len() as i64),
                    SequenceOp::Any => Value::Bool(!filtered.is_empty()),
                    SequenceOp::First => match filtered.into_iter().next() {
                        Some(first) => first,
                        None => eval_err!("sequence contains no matching element"),
                    },
                    _ => filtered.into_iter().next().unwrap_or(Value::Null),
                }
            }
            SequenceOp::Take | SequenceOp::Skip => {
                let count = match self.eval(&args[1], env)? {
                    Value::Int64(n) => usize::try_from(n).unwrap_or(0),
                    other => eval_err!("{} count is {}", call.op(), other.type_name()),
                };
                if call.op() == SequenceOp::Take {
                    Value::sequence(source.into_iter().take(count))
                } else {
                    Value::sequence(source.into_iter().skip(count))
                }
            }
            SequenceOp::Distinct => {
                let mut unique: Vec<Value> = Vec::new();
                for item in source {
                    if !unique.iter().any(|seen| values_equal(seen, &item)) {
                        unique.push(item);
                    }
                }
                Value::sequence(unique)
            }
            SequenceOp::ToList
            | SequenceOp::AsNoTracking
            | SequenceOp::AsTracking
            | SequenceOp::TagWith
            | SequenceOp::IgnoreQueryFilters => Value::sequence(source),
        };

        Ok(result)
    }

    fn eval_binary(&self, op: BinaryOp, left: &Expr, right: &Expr, env: &Env) -> QuillResult<Value> {
        match op {
            BinaryOp::AndAlso => {
                if !truthy(&self.eval(left, env)?)? {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(truthy(&self.eval(right, env)?)?));
            }
            BinaryOp::OrElse => {
                if truthy(&self.eval(left, env)?)? {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(truthy(&self.eval(right, env)?)?));
            }
            _ => {}
        }

        let (l, r) = (self.eval(left, env)?, self.eval(right, env)?);
        match op {
            BinaryOp::Equal => Ok(Value::Bool(values_equal(&l, &r))),
            BinaryOp::NotEqual => Ok(Value::Bool(!values_equal(&l, &r))),
            BinaryOp::LessThan | BinaryOp::GreaterThan => {
                if l.is_null() || r.is_null() {
                    return Ok(Value::Bool(false));
                }
                let ordering = l.total_cmp(&r);
                Ok(Value::Bool(if op == BinaryOp::LessThan {
                    ordering.is_lt()
                } else {
                    ordering.is_gt()
                }))
            }
            _ => arithmetic(op, &l, &r),
        }
    }
}

fn truthy(value: &Value) -> QuillResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => eval_err!("expected a boolean, got {}", other.type_name()),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int64(_), Value::Float64(_)) | (Value::Float64(_), Value::Int64(_)) => {
            a.as_float64() == b.as_float64()
        }
        _ => a == b,
    }
}

fn keys_match(outer: &Value, inner: &Value) -> bool {
    !outer.is_null() && !inner.is_null() && values_equal(outer, inner)
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> QuillResult<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    match (l, r) {
        (Value::Int64(a), Value::Int64(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Subtract => a.checked_sub(*b),
                BinaryOp::Multiply => a.checked_mul(*b),
                _ => None,
            };
            result
                .map(Value::Int64)
                .ok_or_else(|| QuillError::evaluation(format!("{a} {op} {b} overflows")))
        }
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{a}{b}")))
        }
        _ => match (l.as_float64(), r.as_float64()) {
            (Some(a), Some(b)) => Ok(Value::Float64(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                _ => a * b,
            })),
            _ => eval_err!("cannot apply '{op}' to {} and {}", l.type_name(), r.type_name()),
        },
    }
}
