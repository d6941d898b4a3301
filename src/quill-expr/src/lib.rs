//! Query expression trees for Quill.
//!
//! This crate provides:
//! - `Expr`, an immutable and structurally shared expression tree
//! - the sequence operator table (`method`) and call builders (`query`)
//! - identity-preserving rewriting and substitution (`rewrite`)
//! - whole-tree validation and an in-memory interpreter

pub mod display;
pub mod expr;
pub mod interpret;
pub mod method;
pub mod query;
pub mod rewrite;
pub mod validation;

// Re-export commonly used types
pub use expr::{
    BinaryOp, EntityShaperExpr, Expr, ExprKind, FlattenedGroupJoinExpr, LambdaExpr,
    MethodCallExpr, NodeKey, ParamId, ParameterExpr, ProjectionBinding, ProjectionBindingExpr,
    ProjectionMember,
};
pub use interpret::{DataSource, Interpreter};
pub use method::{DeclaringType, MethodSignature, ParamShape, ReturnShape, SequenceOp};
pub use rewrite::{ExprRewriter, Substitution, replace, rewrite_children};
pub use validation::validate;
