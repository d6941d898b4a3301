//! Sequence operator calls.

use quill_core::Type;

use common_error::{QuillError, QuillResult, ensure};

use super::{Expr, ExprKind, LambdaExpr};
use crate::method::{DeclaringType, MethodSignature, ParamShape, SequenceOp};

/// A call of a sequence operator.
///
/// The call pins one overload together with its type arguments. Lambda
/// arguments of translatable operators are always stored quoted.
#[derive(Debug, Clone)]
pub struct MethodCallExpr {
    method: &'static MethodSignature,
    type_args: Vec<Type>,
    args: Vec<Expr>,
    ty: Type,
}

impl MethodCallExpr {
    /// Create a call of `method` with explicit type arguments.
    pub fn new(
        method: &'static MethodSignature,
        type_args: Vec<Type>,
        args: Vec<Expr>,
    ) -> QuillResult<Self> {
        ensure!(
            type_args.len() == method.generic_arity,
            TypeError: "{method} expects {} type arguments, got {}",
            method.generic_arity,
            type_args.len()
        );
        ensure!(
            args.len() == method.arity(),
            TypeError: "{method} expects {} arguments, got {}",
            method.arity(),
            args.len()
        );

        let args = if method.declaring.quotes_lambdas() {
            args.into_iter()
                .map(|arg| match arg.kind() {
                    ExprKind::Lambda(_) => Expr::quote(arg),
                    _ => arg,
                })
                .collect()
        } else {
            args
        };

        let ty = method.return_type(&type_args)?;
        Ok(Self {
            method,
            type_args,
            args,
            ty,
        })
    }

    /// Create a call, resolving the overload and type arguments from the
    /// arguments.
    pub fn infer(declaring: DeclaringType, op: SequenceOp, args: Vec<Expr>) -> QuillResult<Self> {
        let method = MethodSignature::declared_by(declaring)
            .find(|m| {
                m.op == op
                    && m.arity() == args.len()
                    && m.params.iter().zip(&args).all(|(shape, arg)| fits(*shape, arg))
            })
            .ok_or_else(|| {
                QuillError::type_error(format!(
                    "no overload of {declaring}.{op} accepts the given {} arguments",
                    args.len()
                ))
            })?;

        let type_args = infer_type_args(method, &args)?;
        Self::new(method, type_args, args)
    }

    /// The called overload.
    pub const fn method(&self) -> &'static MethodSignature {
        self.method
    }

    /// Operator name.
    pub const fn op(&self) -> SequenceOp {
        self.method.op
    }

    /// Declaring type.
    pub const fn declaring(&self) -> DeclaringType {
        self.method.declaring
    }

    /// Type arguments.
    pub fn type_args(&self) -> &[Type] {
        &self.type_args
    }

    /// Arguments, source first.
    pub fn args(&self) -> &[Expr] {
        &self.args
    }

    /// The source sequence argument.
    pub fn source(&self) -> &Expr {
        &self.args[0]
    }

    /// Result type.
    pub const fn ty(&self) -> &Type {
        &self.ty
    }

    /// The lambda at `position`, looking through a quote.
    pub fn lambda(&self, position: usize) -> Option<&LambdaExpr> {
        self.args.get(position).and_then(Expr::as_lambda)
    }

    /// Whether this is a call of `op` declared by `declaring`.
    pub fn is(&self, declaring: DeclaringType, op: SequenceOp) -> bool {
        self.method.declaring == declaring && self.method.op == op
    }

    /// Same overload and type arguments over new arguments.
    pub fn with_args(&self, args: Vec<Expr>) -> QuillResult<Self> {
        Self::new(self.method, self.type_args.clone(), args)
    }
}

fn fits(shape: ParamShape, arg: &Expr) -> bool {
    match shape {
        ParamShape::Source | ParamShape::Sequence => arg.ty().is_sequence(),
        ParamShape::Lambda(n) => arg.as_lambda().is_some_and(|l| l.params().len() == n),
        ParamShape::IndexedLambda => arg
            .as_lambda()
            .is_some_and(|l| l.params().len() == 2 && *l.params()[1].ty() == Type::Int64),
        ParamShape::Scalar => arg.as_lambda().is_none() && !arg.ty().is_sequence(),
    }
}

fn infer_type_args(method: &MethodSignature, args: &[Expr]) -> QuillResult<Vec<Type>> {
    let element_of = |ty: &Type| {
        ty.sequence_element()
            .cloned()
            .ok_or_else(|| QuillError::type_error(format!("{method}: {ty} is not a sequence")))
    };
    let returns = |position: usize| {
        args.get(position)
            .and_then(Expr::as_lambda)
            .map(|l| l.body().ty())
            .ok_or_else(|| {
                QuillError::type_error(format!("{method}: argument {position} is not a lambda"))
            })
    };

    let source = element_of(&args[0].ty())?;
    Ok(match (method.op, method.generic_arity) {
        (SequenceOp::Select | SequenceOp::OrderBy | SequenceOp::OrderByDescending, _) => {
            vec![source, returns(1)?]
        }
        (SequenceOp::SelectMany, 2) => vec![source, element_of(&returns(1)?)?],
        (SequenceOp::SelectMany, _) => {
            vec![source, element_of(&returns(1)?)?, returns(2)?]
        }
        (SequenceOp::Join | SequenceOp::GroupJoin | SequenceOp::LeftJoin, _) => vec![
            source,
            element_of(&args[1].ty())?,
            returns(2)?,
            returns(4)?,
        ],
        _ => vec![source],
    })
}
