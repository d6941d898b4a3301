//! Well-typedness checks for expression trees.
//!
//! Builders check local typing when a node is created; [`validate`] checks
//! a whole tree, including that every parameter reference is bound by an
//! enclosing lambda.

use std::collections::HashSet;

use quill_core::Type;

use common_error::{QuillError, QuillResult};

use crate::expr::{Expr, ExprKind, MethodCallExpr, ParamId};
use crate::method::ParamShape;

/// Check that `expr` is closed and well typed.
pub fn validate(expr: &Expr) -> QuillResult<()> {
    Validator::default().visit(expr)
}

#[derive(Default)]
struct Validator {
    scope: HashSet<ParamId>,
}

impl Validator {
    fn visit(&mut self, expr: &Expr) -> QuillResult<()> {
        match expr.kind() {
            ExprKind::Parameter(p) => {
                if !self.scope.contains(&p.id()) {
                    return Err(QuillError::invariant(format!(
                        "parameter '{}' is referenced outside its lambda",
                        p.name()
                    )));
                }
                return Ok(());
            }
            ExprKind::Lambda(lambda) => {
                let added = lambda
                    .params()
                    .iter()
                    .filter(|p| self.scope.insert(p.id()))
                    .map(|p| p.id())
                    .collect::<Vec<_>>();
                let result = self.visit(lambda.body());
                for id in added {
                    self.scope.remove(&id);
                }
                return result;
            }
            ExprKind::Member { expr: target, member, ty } => {
                if let Type::Record(record) = target.ty() {
                    match record.field(member) {
                        Some(field) if field == ty => {}
                        Some(field) => {
                            return Err(QuillError::type_error(format!(
                                "{}.{member} is {field}, node says {ty}",
                                record.name
                            )));
                        }
                        None => {
                            return Err(QuillError::type_error(format!(
                                "{} has no field '{member}'",
                                record.name
                            )));
                        }
                    }
                }
            }
            ExprKind::Call(call) => check_call(call)?,
            ExprKind::Binary { op, left, right, ty } => {
                let (lt, rt) = (left.ty(), right.ty());
                if op.result_type(&lt, &rt).as_ref() != Some(ty) {
                    return Err(QuillError::type_error(format!(
                        "'{op}' over {lt} and {rt} does not produce {ty}"
                    )));
                }
            }
            ExprKind::Not(operand) => expect(&Type::Bool, &operand.ty(), "negation")?,
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
                ty,
            } => {
                expect(&Type::Bool, &test.ty(), "conditional test")?;
                expect(ty, &if_true.ty(), "conditional branch")?;
                expect(ty, &if_false.ty(), "conditional branch")?;
            }
            ExprKind::New { record, args } => {
                for ((name, field_ty), arg) in record.fields.iter().zip(args) {
                    expect(field_ty, &arg.ty(), name)?;
                }
            }
            ExprKind::FlattenedGroupJoin(_) => {
                return Err(QuillError::invariant(
                    "a flattened group join escaped the flattening pass",
                ));
            }
            ExprKind::Constant { .. }
            | ExprKind::Quote(_)
            | ExprKind::QueryRoot { .. }
            | ExprKind::EntityQueryable(_)
            | ExprKind::ProjectionBinding(_)
            | ExprKind::EntityShaper(_) => {}
        }

        for child in expr.children() {
            self.visit(child)?;
        }
        Ok(())
    }
}

fn expect(expected: &Type, actual: &Type, what: &str) -> QuillResult<()> {
    if expected.is_assignable_from(actual) {
        Ok(())
    } else {
        Err(QuillError::type_error(format!(
            "{what}: expected {expected}, got {actual}"
        )))
    }
}

fn check_call(call: &MethodCallExpr) -> QuillResult<()> {
    let method = call.method();
    let type_args = call.type_args();
    let kind = method.declaring.sequence_kind();

    for (position, (shape, arg)) in method.params.iter().zip(call.args()).enumerate() {
        let what = format!("argument {position} of {method}");
        match shape {
            ParamShape::Source => {
                let expected = Type::Sequence {
                    kind,
                    element: Box::new(type_args[0].clone()),
                };
                expect(&expected, &arg.ty(), &what)?;
            }
            ParamShape::Sequence => {
                expect(&Type::enumerable(type_args[1].clone()), &arg.ty(), &what)?;
            }
            ParamShape::Lambda(_) | ParamShape::IndexedLambda => {
                if method.declaring.quotes_lambdas() && !matches!(arg.kind(), ExprKind::Quote(_)) {
                    return Err(QuillError::type_error(format!("{what} must be quoted")));
                }
                let lambda = arg
                    .as_lambda()
                    .ok_or_else(|| QuillError::type_error(format!("{what} must be a lambda")))?;
                let Some((params, ret)) = method.lambda_signature(type_args, position) else {
                    continue;
                };
                let actual = lambda.params().iter().map(|p| p.ty().clone()).collect::<Vec<_>>();
                if actual != params {
                    return Err(QuillError::type_error(format!(
                        "{what} takes {actual:?}, expected {params:?}"
                    )));
                }
                if let Some(ret) = ret {
                    expect(&ret, &lambda.body().ty(), &what)?;
                }
            }
            ParamShape::Scalar => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use quill_core::Type;

    use super::*;
    use crate::expr::{BinaryOp, ParameterExpr};
    use crate::query::{enumerable, lambda, queryable};

    #[test]
    fn test_valid_query() {
        let query = queryable::select(
            Expr::query_root("Outer"),
            lambda(&[("o", Type::entity("Outer"))], |p| {
                Ok(Expr::member(p[0].clone(), "Id", Type::Int64))
            })
            .unwrap(),
        )
        .unwrap();
        assert!(validate(&query).is_ok());
    }

    #[test]
    fn test_unbound_parameter() {
        let g = ParameterExpr::new("g", Type::enumerable(Type::entity("Inner")));
        let leaked = queryable::select(
            Expr::query_root("Outer"),
            lambda(&[("o", Type::entity("Outer"))], |_| {
                enumerable::count(Expr::parameter(&g))
            })
            .unwrap(),
        )
        .unwrap();

        assert!(matches!(validate(&leaked), Err(QuillError::InvariantViolation(_))));
    }

    #[test]
    fn test_lambda_parameter_mismatch() {
        let x = ParameterExpr::new("x", Type::String);
        let bad = Expr::lambda(
            vec![x.clone()],
            Expr::binary(BinaryOp::Equal, Expr::parameter(&x), Expr::constant("a")).unwrap(),
        );
        let source = Expr::query_root("Outer");
        let method = crate::method::MethodSignature::resolve(
            crate::method::DeclaringType::Queryable,
            crate::method::SequenceOp::Where,
            &[ParamShape::Source, ParamShape::Lambda(1)],
        )
        .unwrap();
        let call = Expr::call_method(method, vec![Type::entity("Outer")], vec![source, bad]).unwrap();

        assert!(matches!(validate(&call), Err(QuillError::TypeError(_))));
    }
}
