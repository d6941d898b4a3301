//! Query expression trees.
//!
//! An [`Expr`] is an immutable, reference-counted node. Cloning an `Expr`
//! shares the node; rewrites allocate new nodes only along changed paths, so
//! untouched subtrees keep their identity.

mod binary;
mod call;
mod flattened;
mod parameter;
mod shaper;

use std::sync::Arc;

use quill_core::types::TRANSPARENT_IDENTIFIER;
use quill_core::{EntityType, RecordType, Type, Value};

use common_error::{QuillError, QuillResult, ensure, type_err};

pub use binary::BinaryOp;
pub use call::MethodCallExpr;
pub use flattened::FlattenedGroupJoinExpr;
pub use parameter::{ParamId, ParameterExpr};
pub use shaper::{EntityShaperExpr, ProjectionBinding, ProjectionBindingExpr, ProjectionMember};

use crate::method::{DeclaringType, MethodSignature, SequenceOp};

/// A lambda: formal parameters and a body.
#[derive(Debug, Clone)]
pub struct LambdaExpr {
    params: Vec<ParameterExpr>,
    body: Expr,
}

impl LambdaExpr {
    /// Formal parameters.
    pub fn params(&self) -> &[ParameterExpr] {
        &self.params
    }

    /// The single parameter of a one-parameter lambda.
    pub fn param(&self, index: usize) -> Option<&ParameterExpr> {
        self.params.get(index)
    }

    /// Body.
    pub const fn body(&self) -> &Expr {
        &self.body
    }

    /// Function type of this lambda.
    pub fn ty(&self) -> Type {
        Type::function(
            self.params.iter().map(|p| p.ty().clone()).collect(),
            self.body.ty(),
        )
    }
}

/// The kind of an expression node.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A literal value.
    Constant { value: Value, ty: Type },
    /// Reference to a lambda parameter.
    Parameter(ParameterExpr),
    /// Member access on an entity or record.
    Member {
        expr: Expr,
        member: String,
        ty: Type,
    },
    /// Sequence operator call.
    Call(MethodCallExpr),
    /// Lambda.
    Lambda(LambdaExpr),
    /// A quoted lambda passed to a translatable operator.
    Quote(Expr),
    /// Binary operation.
    Binary {
        op: BinaryOp,
        left: Expr,
        right: Expr,
        ty: Type,
    },
    /// Logical negation.
    Not(Expr),
    /// `test ? if_true : if_false`.
    Conditional {
        test: Expr,
        if_true: Expr,
        if_false: Expr,
        ty: Type,
    },
    /// Record construction, one argument per field.
    New { record: RecordType, args: Vec<Expr> },
    /// A query root naming an entity that has not been resolved yet.
    QueryRoot { entity: String },
    /// A query root bound to mapped metadata.
    EntityQueryable(Arc<EntityType>),
    /// Read of a row-buffer slot.
    ProjectionBinding(ProjectionBindingExpr),
    /// Materialization of an entity from a row buffer.
    EntityShaper(EntityShaperExpr),
    /// Intermediate state of group-join flattening.
    FlattenedGroupJoin(FlattenedGroupJoinExpr),
}

/// Identity of a node, used as a replacement key.
///
/// Parameters are identified by their [`ParamId`] so that every reference to
/// the same formal parameter shares one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKey {
    /// A parameter reference.
    Parameter(ParamId),
    /// Any other node, by address.
    Node(usize),
}

/// An immutable expression node.
#[derive(Debug, Clone)]
pub struct Expr(Arc<ExprKind>);

impl Expr {
    fn new(kind: ExprKind) -> Self {
        Self(Arc::new(kind))
    }

    /// Create a constant, inferring its type from the value.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = value_type(&value);
        Self::new(ExprKind::Constant { value, ty })
    }

    /// Create a constant of an explicit type.
    pub fn typed_constant(value: impl Into<Value>, ty: Type) -> Self {
        Self::new(ExprKind::Constant {
            value: value.into(),
            ty,
        })
    }

    /// Create an untyped `null`.
    pub fn null() -> Self {
        Self::typed_constant(Value::Null, Type::Null)
    }

    /// Create a parameter reference.
    pub fn parameter(param: &ParameterExpr) -> Self {
        Self::new(ExprKind::Parameter(param.clone()))
    }

    /// Create a member access with an explicit result type.
    pub fn member(expr: Self, member: impl Into<String>, ty: Type) -> Self {
        Self::new(ExprKind::Member {
            expr,
            member: member.into(),
            ty,
        })
    }

    /// Access a mapped property or navigation of an entity.
    pub fn property(expr: Self, entity_type: &EntityType, member: &str) -> QuillResult<Self> {
        let ty = entity_type.member_type(member).ok_or_else(|| {
            QuillError::type_error(format!(
                "'{}' has no member '{member}'",
                entity_type.name
            ))
        })?;
        Ok(Self::member(expr, member, ty))
    }

    /// Access a field of a record-typed expression.
    pub fn field(expr: Self, member: &str) -> QuillResult<Self> {
        let ty = expr.ty();
        let field = ty.record_field(member).cloned().ok_or_else(|| {
            QuillError::type_error(format!("{ty} has no field '{member}'"))
        })?;
        Ok(Self::member(expr, member, field))
    }

    /// Create a lambda.
    pub fn lambda(params: Vec<ParameterExpr>, body: Self) -> Self {
        Self::new(ExprKind::Lambda(LambdaExpr { params, body }))
    }

    /// Quote a lambda.
    pub fn quote(lambda: Self) -> Self {
        Self::new(ExprKind::Quote(lambda))
    }

    /// Create a binary operation, checking operand types.
    pub fn binary(op: BinaryOp, left: Self, right: Self) -> QuillResult<Self> {
        let (lt, rt) = (left.ty(), right.ty());
        let ty = op.result_type(&lt, &rt).ok_or_else(|| {
            QuillError::type_error(format!("cannot apply '{op}' to {lt} and {rt}"))
        })?;
        Ok(Self::new(ExprKind::Binary {
            op,
            left,
            right,
            ty,
        }))
    }

    /// `left == right`.
    pub fn equal(left: Self, right: Self) -> QuillResult<Self> {
        Self::binary(BinaryOp::Equal, left, right)
    }

    /// `left != right`.
    pub fn not_equal(left: Self, right: Self) -> QuillResult<Self> {
        Self::binary(BinaryOp::NotEqual, left, right)
    }

    /// Logical negation of a boolean expression.
    pub fn not(operand: Self) -> QuillResult<Self> {
        let ty = operand.ty();
        if ty != Type::Bool {
            type_err!("cannot negate {ty}");
        }
        Ok(Self::new(ExprKind::Not(operand)))
    }

    /// Create a conditional, typing it by the common type of its branches.
    pub fn conditional(test: Self, if_true: Self, if_false: Self) -> QuillResult<Self> {
        let test_ty = test.ty();
        if test_ty != Type::Bool {
            type_err!("conditional test must be Bool, got {test_ty}");
        }
        let (a, b) = (if_true.ty(), if_false.ty());
        let ty = a.common_supertype(&b).ok_or_else(|| {
            QuillError::type_error(format!("conditional branches {a} and {b} have no common type"))
        })?;
        Ok(Self::new(ExprKind::Conditional {
            test,
            if_true,
            if_false,
            ty,
        }))
    }

    /// Construct a record from one argument per field.
    pub fn new_record(record: RecordType, args: Vec<Self>) -> QuillResult<Self> {
        ensure!(
            record.fields.len() == args.len(),
            TypeError: "{} has {} fields, got {} arguments",
            record.name,
            record.fields.len(),
            args.len()
        );
        for ((name, field_ty), arg) in record.fields.iter().zip(&args) {
            let arg_ty = arg.ty();
            if !field_ty.is_assignable_from(&arg_ty) {
                type_err!("{}.{name} is {field_ty}, got {arg_ty}", record.name);
            }
        }
        Ok(Self::new(ExprKind::New { record, args }))
    }

    /// Pair an outer and an inner element in a transparent identifier.
    pub fn transparent_identifier(outer: Self, inner: Self) -> Self {
        let record = RecordType::new(
            TRANSPARENT_IDENTIFIER,
            [("Outer", outer.ty()), ("Inner", inner.ty())],
        );
        Self::new(ExprKind::New {
            record,
            args: vec![outer, inner],
        })
    }

    /// Create an unresolved query root.
    pub fn query_root(entity: impl Into<String>) -> Self {
        Self::new(ExprKind::QueryRoot {
            entity: entity.into(),
        })
    }

    /// Create a query root bound to metadata.
    pub fn entity_queryable(entity_type: Arc<EntityType>) -> Self {
        Self::new(ExprKind::EntityQueryable(entity_type))
    }

    /// Call an operator, resolving the overload from the arguments.
    pub fn call(declaring: DeclaringType, op: SequenceOp, args: Vec<Self>) -> QuillResult<Self> {
        Ok(Self::new(ExprKind::Call(MethodCallExpr::infer(
            declaring, op, args,
        )?)))
    }

    /// Call a specific overload with explicit type arguments.
    pub fn call_method(
        method: &'static MethodSignature,
        type_args: Vec<Type>,
        args: Vec<Self>,
    ) -> QuillResult<Self> {
        Ok(Self::new(ExprKind::Call(MethodCallExpr::new(
            method, type_args, args,
        )?)))
    }

    /// Wrap a projection binding.
    pub fn projection_binding(binding: ProjectionBindingExpr) -> Self {
        Self::new(ExprKind::ProjectionBinding(binding))
    }

    /// Wrap an entity shaper.
    pub fn entity_shaper(shaper: EntityShaperExpr) -> Self {
        Self::new(ExprKind::EntityShaper(shaper))
    }

    /// Wrap a flattened group join.
    pub fn flattened_group_join(node: FlattenedGroupJoinExpr) -> Self {
        Self::new(ExprKind::FlattenedGroupJoin(node))
    }

    /// The node kind.
    pub fn kind(&self) -> &ExprKind {
        &self.0
    }

    /// Whether two handles refer to the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity key of this node.
    pub fn key(&self) -> NodeKey {
        match self.kind() {
            ExprKind::Parameter(p) => NodeKey::Parameter(p.id()),
            _ => NodeKey::Node(Arc::as_ptr(&self.0) as usize),
        }
    }

    /// Static type of this node.
    pub fn ty(&self) -> Type {
        match self.kind() {
            ExprKind::Constant { ty, .. }
            | ExprKind::Member { ty, .. }
            | ExprKind::Binary { ty, .. }
            | ExprKind::Conditional { ty, .. } => ty.clone(),
            ExprKind::Parameter(p) => p.ty().clone(),
            ExprKind::Call(call) => call.ty().clone(),
            ExprKind::Lambda(lambda) => lambda.ty(),
            ExprKind::Quote(lambda) => lambda.ty(),
            ExprKind::Not(_) => Type::Bool,
            ExprKind::New { record, .. } => Type::Record(record.clone()),
            ExprKind::QueryRoot { entity } => Type::queryable(Type::entity(entity.clone())),
            ExprKind::EntityQueryable(entity_type) => Type::queryable(entity_type.clr_type()),
            ExprKind::ProjectionBinding(binding) => binding.ty().clone(),
            ExprKind::EntityShaper(shaper) => shaper.ty(),
            ExprKind::FlattenedGroupJoin(node) => node.source().ty(),
        }
    }

    /// Child nodes in evaluation order.
    pub fn children(&self) -> Vec<&Self> {
        match self.kind() {
            ExprKind::Constant { .. }
            | ExprKind::Parameter(_)
            | ExprKind::QueryRoot { .. }
            | ExprKind::EntityQueryable(_)
            | ExprKind::ProjectionBinding(_) => vec![],
            ExprKind::Member { expr, .. } => vec![expr],
            ExprKind::Call(call) => call.args().iter().collect(),
            ExprKind::Lambda(lambda) => vec![lambda.body()],
            ExprKind::Quote(operand) | ExprKind::Not(operand) => vec![operand],
            ExprKind::Binary { left, right, .. } => vec![left, right],
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => vec![test, if_true, if_false],
            ExprKind::New { args, .. } => args.iter().collect(),
            ExprKind::EntityShaper(shaper) => vec![shaper.value_buffer()],
            ExprKind::FlattenedGroupJoin(node) => vec![node.source()],
        }
    }

    /// Rebuild this node over new children, keeping every other attribute.
    ///
    /// Always allocates; use [`crate::rewrite::rewrite_children`] to keep
    /// identity when nothing changed.
    pub fn with_new_children(&self, children: Vec<Self>) -> QuillResult<Self> {
        let expected = self.children().len();
        if children.len() != expected {
            return Err(QuillError::internal(format!(
                "node expects {expected} children, got {}",
                children.len()
            )));
        }

        let mut children = children.into_iter();
        let mut next = || {
            children
                .next()
                .ok_or_else(|| QuillError::internal("child count mismatch"))
        };

        let kind = match self.kind() {
            ExprKind::Constant { .. }
            | ExprKind::Parameter(_)
            | ExprKind::QueryRoot { .. }
            | ExprKind::EntityQueryable(_)
            | ExprKind::ProjectionBinding(_) => return Ok(self.clone()),
            ExprKind::Member { member, ty, .. } => ExprKind::Member {
                expr: next()?,
                member: member.clone(),
                ty: ty.clone(),
            },
            ExprKind::Call(call) => {
                let args = (0..call.args().len())
                    .map(|_| next())
                    .collect::<QuillResult<Vec<_>>>()?;
                ExprKind::Call(call.with_args(args)?)
            }
            ExprKind::Lambda(lambda) => ExprKind::Lambda(LambdaExpr {
                params: lambda.params.clone(),
                body: next()?,
            }),
            ExprKind::Quote(_) => ExprKind::Quote(next()?),
            ExprKind::Not(_) => ExprKind::Not(next()?),
            ExprKind::Binary { op, ty, .. } => ExprKind::Binary {
                op: *op,
                left: next()?,
                right: next()?,
                ty: ty.clone(),
            },
            ExprKind::Conditional { ty, .. } => ExprKind::Conditional {
                test: next()?,
                if_true: next()?,
                if_false: next()?,
                ty: ty.clone(),
            },
            ExprKind::New { record, args } => ExprKind::New {
                record: record.clone(),
                args: (0..args.len()).map(|_| next()).collect::<QuillResult<_>>()?,
            },
            ExprKind::EntityShaper(shaper) => {
                ExprKind::EntityShaper(shaper.with_value_buffer(next()?)?)
            }
            ExprKind::FlattenedGroupJoin(node) => {
                ExprKind::FlattenedGroupJoin(node.with_source(next()?))
            }
        };

        Ok(Self::new(kind))
    }

    /// The lambda of a lambda or quoted-lambda node.
    pub fn as_lambda(&self) -> Option<&LambdaExpr> {
        match self.kind() {
            ExprKind::Lambda(lambda) => Some(lambda),
            ExprKind::Quote(inner) => match inner.kind() {
                ExprKind::Lambda(lambda) => Some(lambda),
                _ => None,
            },
            _ => None,
        }
    }

    /// The call if this node is an operator call.
    pub fn as_call(&self) -> Option<&MethodCallExpr> {
        match self.kind() {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }

    /// The parameter if this node is a parameter reference.
    pub fn as_parameter(&self) -> Option<&ParameterExpr> {
        match self.kind() {
            ExprKind::Parameter(p) => Some(p),
            _ => None,
        }
    }

    /// Whether this node is a `null` constant.
    pub fn is_null_constant(&self) -> bool {
        matches!(self.kind(), ExprKind::Constant { value: Value::Null, .. })
    }

    /// Whether this node references `param` anywhere.
    pub fn references(&self, param: &ParameterExpr) -> bool {
        match self.kind() {
            ExprKind::Parameter(p) => p == param,
            ExprKind::FlattenedGroupJoin(node) => {
                node.source().references(param)
                    || node.result_selector_body().references(param)
            }
            _ => self.children().into_iter().any(|c| c.references(param)),
        }
    }

    /// Structural equality: same shape, same parameters, equal constants.
    pub fn structurally_eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }

        let same_node = match (self.kind(), other.kind()) {
            (
                ExprKind::Constant { value: a, ty: at },
                ExprKind::Constant { value: b, ty: bt },
            ) => a == b && at == bt,
            (ExprKind::Parameter(a), ExprKind::Parameter(b)) => a == b,
            (
                ExprKind::Member {
                    member: a, ty: at, ..
                },
                ExprKind::Member {
                    member: b, ty: bt, ..
                },
            ) => a == b && at == bt,
            (ExprKind::Call(a), ExprKind::Call(b)) => {
                a.method() == b.method() && a.type_args() == b.type_args()
            }
            (ExprKind::Lambda(a), ExprKind::Lambda(b)) => a.params == b.params,
            (ExprKind::Quote(_), ExprKind::Quote(_)) | (ExprKind::Not(_), ExprKind::Not(_)) => true,
            (ExprKind::Binary { op: a, .. }, ExprKind::Binary { op: b, .. }) => a == b,
            (ExprKind::Conditional { ty: a, .. }, ExprKind::Conditional { ty: b, .. }) => a == b,
            (ExprKind::New { record: a, .. }, ExprKind::New { record: b, .. }) => a == b,
            (ExprKind::QueryRoot { entity: a }, ExprKind::QueryRoot { entity: b }) => a == b,
            (ExprKind::EntityQueryable(a), ExprKind::EntityQueryable(b)) => a.name == b.name,
            (ExprKind::ProjectionBinding(a), ExprKind::ProjectionBinding(b)) => a == b,
            (ExprKind::EntityShaper(a), ExprKind::EntityShaper(b)) => {
                a.entity_type().name == b.entity_type().name && a.is_nullable() == b.is_nullable()
            }
            _ => false,
        };

        if !same_node {
            return false;
        }

        let (left, right) = (self.children(), other.children());
        left.len() == right.len() && left.iter().zip(&right).all(|(a, b)| a.structurally_eq(b))
    }
}

fn value_type(value: &Value) -> Type {
    match value {
        Value::Null => Type::Null,
        Value::Bool(_) => Type::Bool,
        Value::Int64(_) => Type::Int64,
        Value::Float64(_) => Type::Float64,
        Value::String(_) => Type::String,
        Value::Record(record) => Type::entity(record.type_name.clone()),
        Value::Sequence(items) => {
            Type::enumerable(items.first().map_or(Type::Null, value_type))
        }
    }
}

impl std::fmt::Display for LambdaExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.params.as_slice() {
            [single] => write!(f, "{} => {}", single.name(), self.body),
            params => {
                let names = params.iter().map(ParameterExpr::name).collect::<Vec<_>>();
                write!(f, "({}) => {}", names.join(", "), self.body)
            }
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            ExprKind::Constant { value, .. } => write!(f, "{value}"),
            ExprKind::Parameter(p) => write!(f, "{}", p.name()),
            ExprKind::Member { expr, member, .. } => write!(f, "{expr}.{member}"),
            ExprKind::Call(call) => {
                let (source, rest) = call.args().split_first().ok_or(std::fmt::Error)?;
                let rest = rest.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "{source}.{}({})", call.op(), rest.join(", "))
            }
            ExprKind::Lambda(lambda) => write!(f, "{lambda}"),
            ExprKind::Quote(operand) => write!(f, "{operand}"),
            ExprKind::Binary {
                op, left, right, ..
            } => write!(f, "({left} {op} {right})"),
            ExprKind::Not(operand) => write!(f, "!{operand}"),
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => write!(f, "({test} ? {if_true} : {if_false})"),
            ExprKind::New { record, args } => {
                let fields = record
                    .fields
                    .iter()
                    .zip(args)
                    .map(|((name, _), arg)| format!("{name} = {arg}"))
                    .collect::<Vec<_>>();
                write!(f, "new {} {{ {} }}", record.name, fields.join(", "))
            }
            ExprKind::QueryRoot { entity } => write!(f, "QueryRoot<{entity}>"),
            ExprKind::EntityQueryable(entity_type) => write!(f, "DbSet<{}>", entity_type.name),
            ExprKind::ProjectionBinding(binding) => write!(f, "{binding}"),
            ExprKind::EntityShaper(shaper) => write!(
                f,
                "EntityShaper<{}>({}, nullable: {})",
                shaper.entity_type().name,
                shaper.value_buffer(),
                shaper.is_nullable()
            ),
            ExprKind::FlattenedGroupJoin(node) => {
                write!(f, "FlattenedGroupJoin({})", node.source())
            }
        }
    }
}
