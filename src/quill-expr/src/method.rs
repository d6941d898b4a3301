//! Sequence operators and their overload table.
//!
//! Operators are described by static [`MethodSignature`] entries rather than
//! looked up by reflection: the table is plain data, and every call node
//! points at exactly one entry.

use quill_core::{SequenceKind, Type};
use serde::{Deserialize, Serialize};

use common_error::{QuillError, QuillResult};

/// The type that declares an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclaringType {
    /// Translatable operators (`Queryable`).
    Queryable,
    /// In-memory operators (`Enumerable`).
    Enumerable,
    /// Operators specific to entity queries (`LeftJoin`, tracking markers).
    EntityQueryable,
}

impl DeclaringType {
    /// Sequence kind produced by operators of this type.
    pub const fn sequence_kind(self) -> SequenceKind {
        match self {
            Self::Enumerable => SequenceKind::Enumerable,
            Self::Queryable | Self::EntityQueryable => SequenceKind::Queryable,
        }
    }

    /// Whether lambda arguments are passed quoted.
    pub const fn quotes_lambdas(self) -> bool {
        !matches!(self, Self::Enumerable)
    }
}

impl std::fmt::Display for DeclaringType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queryable => write!(f, "Queryable"),
            Self::Enumerable => write!(f, "Enumerable"),
            Self::EntityQueryable => write!(f, "EntityQueryable"),
        }
    }
}

/// Sequence operator names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SequenceOp {
    Where,
    Select,
    SelectMany,
    Join,
    GroupJoin,
    LeftJoin,
    OrderBy,
    OrderByDescending,
    DefaultIfEmpty,
    Count,
    Any,
    First,
    FirstOrDefault,
    Take,
    Skip,
    Distinct,
    ToList,
    AsNoTracking,
    AsTracking,
    TagWith,
    IgnoreQueryFilters,
}

impl SequenceOp {
    /// Operator name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Where => "Where",
            Self::Select => "Select",
            Self::SelectMany => "SelectMany",
            Self::Join => "Join",
            Self::GroupJoin => "GroupJoin",
            Self::LeftJoin => "LeftJoin",
            Self::OrderBy => "OrderBy",
            Self::OrderByDescending => "OrderByDescending",
            Self::DefaultIfEmpty => "DefaultIfEmpty",
            Self::Count => "Count",
            Self::Any => "Any",
            Self::First => "First",
            Self::FirstOrDefault => "FirstOrDefault",
            Self::Take => "Take",
            Self::Skip => "Skip",
            Self::Distinct => "Distinct",
            Self::ToList => "ToList",
            Self::AsNoTracking => "AsNoTracking",
            Self::AsTracking => "AsTracking",
            Self::TagWith => "TagWith",
            Self::IgnoreQueryFilters => "IgnoreQueryFilters",
        }
    }
}

impl std::fmt::Display for SequenceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Shape of one operator parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamShape {
    /// The source sequence.
    Source,
    /// A second sequence (the inner side of a join).
    Sequence,
    /// A lambda taking the given number of parameters.
    Lambda(usize),
    /// A lambda taking an element and its positional index.
    IndexedLambda,
    /// A plain value such as a count or a tag.
    Scalar,
}

/// Result of an operator, in terms of its type arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnShape {
    /// A sequence of the given type argument.
    SequenceOf(usize),
    /// A single element of the given type argument.
    ElementOf(usize),
    /// A count.
    Int64,
    /// A boolean.
    Bool,
}

/// One operator overload.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Declaring type.
    pub declaring: DeclaringType,
    /// Operator name.
    pub op: SequenceOp,
    /// Number of type arguments.
    pub generic_arity: usize,
    /// Parameter shapes, source first.
    pub params: &'static [ParamShape],
    /// Result shape.
    pub returns: ReturnShape,
}

use DeclaringType::{Enumerable, EntityQueryable, Queryable};
use ParamShape::{IndexedLambda, Lambda, Scalar, Sequence, Source};

const fn sig(
    declaring: DeclaringType,
    op: SequenceOp,
    generic_arity: usize,
    params: &'static [ParamShape],
    returns: ReturnShape,
) -> MethodSignature {
    MethodSignature {
        declaring,
        op,
        generic_arity,
        params,
        returns,
    }
}

macro_rules! sequence_operators {
    ($name:ident, $declaring:expr) => {
        /// Overloads shared by the in-memory and the translatable operator sets.
        pub const $name: &[MethodSignature] = &[
            sig($declaring, SequenceOp::Where, 1, &[Source, Lambda(1)], ReturnShape::SequenceOf(0)),
            sig($declaring, SequenceOp::Where, 1, &[Source, IndexedLambda], ReturnShape::SequenceOf(0)),
            sig($declaring, SequenceOp::Select, 2, &[Source, Lambda(1)], ReturnShape::SequenceOf(1)),
            sig($declaring, SequenceOp::Select, 2, &[Source, IndexedLambda], ReturnShape::SequenceOf(1)),
            sig($declaring, SequenceOp::SelectMany, 2, &[Source, Lambda(1)], ReturnShape::SequenceOf(1)),
            sig($declaring, SequenceOp::SelectMany, 2, &[Source, IndexedLambda], ReturnShape::SequenceOf(1)),
            sig($declaring, SequenceOp::SelectMany, 3, &[Source, Lambda(1), Lambda(2)], ReturnShape::SequenceOf(2)),
            sig($declaring, SequenceOp::SelectMany, 3, &[Source, IndexedLambda, Lambda(2)], ReturnShape::SequenceOf(2)),
            sig($declaring, SequenceOp::Join, 4, &[Source, Sequence, Lambda(1), Lambda(1), Lambda(2)], ReturnShape::SequenceOf(3)),
            sig($declaring, SequenceOp::GroupJoin, 4, &[Source, Sequence, Lambda(1), Lambda(1), Lambda(2)], ReturnShape::SequenceOf(3)),
            sig($declaring, SequenceOp::OrderBy, 2, &[Source, Lambda(1)], ReturnShape::SequenceOf(0)),
            sig($declaring, SequenceOp::OrderByDescending, 2, &[Source, Lambda(1)], ReturnShape::SequenceOf(0)),
            sig($declaring, SequenceOp::DefaultIfEmpty, 1, &[Source], ReturnShape::SequenceOf(0)),
            sig($declaring, SequenceOp::Count, 1, &[Source], ReturnShape::Int64),
            sig($declaring, SequenceOp::Count, 1, &[Source, Lambda(1)], ReturnShape::Int64),
            sig($declaring, SequenceOp::Any, 1, &[Source], ReturnShape::Bool),
            sig($declaring, SequenceOp::Any, 1, &[Source, Lambda(1)], ReturnShape::Bool),
            sig($declaring, SequenceOp::First, 1, &[Source], ReturnShape::ElementOf(0)),
            sig($declaring, SequenceOp::First, 1, &[Source, Lambda(1)], ReturnShape::ElementOf(0)),
            sig($declaring, SequenceOp::FirstOrDefault, 1, &[Source], ReturnShape::ElementOf(0)),
            sig($declaring, SequenceOp::FirstOrDefault, 1, &[Source, Lambda(1)], ReturnShape::ElementOf(0)),
            sig($declaring, SequenceOp::Take, 1, &[Source, Scalar], ReturnShape::SequenceOf(0)),
            sig($declaring, SequenceOp::Skip, 1, &[Source, Scalar], ReturnShape::SequenceOf(0)),
            sig($declaring, SequenceOp::Distinct, 1, &[Source], ReturnShape::SequenceOf(0)),
        ];
    };
}

sequence_operators!(QUERYABLE_METHODS, Queryable);
sequence_operators!(SHARED_ENUMERABLE_METHODS, Enumerable);

/// In-memory operators with no translatable counterpart.
pub const ENUMERABLE_ONLY_METHODS: &[MethodSignature] = &[sig(
    Enumerable,
    SequenceOp::ToList,
    1,
    &[Source],
    ReturnShape::SequenceOf(0),
)];

/// Entity-query operators: the left-join marker and query-level markers.
pub const ENTITY_QUERYABLE_METHODS: &[MethodSignature] = &[
    sig(
        EntityQueryable,
        SequenceOp::LeftJoin,
        4,
        &[Source, Sequence, Lambda(1), Lambda(1), Lambda(2)],
        ReturnShape::SequenceOf(3),
    ),
    sig(
        EntityQueryable,
        SequenceOp::AsNoTracking,
        1,
        &[Source],
        ReturnShape::SequenceOf(0),
    ),
    sig(
        EntityQueryable,
        SequenceOp::AsTracking,
        1,
        &[Source],
        ReturnShape::SequenceOf(0),
    ),
    sig(
        EntityQueryable,
        SequenceOp::TagWith,
        1,
        &[Source, Scalar],
        ReturnShape::SequenceOf(0),
    ),
    sig(
        EntityQueryable,
        SequenceOp::IgnoreQueryFilters,
        1,
        &[Source],
        ReturnShape::SequenceOf(0),
    ),
];

impl MethodSignature {
    /// All overloads declared by a type.
    pub fn declared_by(declaring: DeclaringType) -> impl Iterator<Item = &'static Self> {
        let tables: &[&'static [Self]] = match declaring {
            Queryable => &[QUERYABLE_METHODS],
            Enumerable => &[SHARED_ENUMERABLE_METHODS, ENUMERABLE_ONLY_METHODS],
            EntityQueryable => &[ENTITY_QUERYABLE_METHODS],
        };
        tables.iter().copied().flat_map(<[Self]>::iter)
    }

    /// Find the overload with exactly these parameter shapes.
    pub fn lookup(
        declaring: DeclaringType,
        op: SequenceOp,
        params: &[ParamShape],
    ) -> Option<&'static Self> {
        Self::declared_by(declaring).find(|m| m.op == op && m.params == params)
    }

    /// Find the overload with these parameter shapes, failing if it does not exist.
    pub fn resolve(
        declaring: DeclaringType,
        op: SequenceOp,
        params: &[ParamShape],
    ) -> QuillResult<&'static Self> {
        Self::lookup(declaring, op, params).ok_or_else(|| {
            QuillError::no_equivalent_operator(format!(
                "{declaring}.{op} has no overload taking {params:?}"
            ))
        })
    }

    /// Number of parameters.
    pub const fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether any parameter is a lambda receiving a positional index.
    pub fn is_indexed(&self) -> bool {
        self.params.contains(&IndexedLambda)
    }

    /// Result type given the type arguments.
    pub fn return_type(&self, type_args: &[Type]) -> QuillResult<Type> {
        let arg = |index: usize| {
            type_args.get(index).cloned().ok_or_else(|| {
                QuillError::type_error(format!(
                    "{self} expects {} type arguments, got {}",
                    self.generic_arity,
                    type_args.len()
                ))
            })
        };

        Ok(match self.returns {
            ReturnShape::SequenceOf(index) => Type::Sequence {
                kind: self.declaring.sequence_kind(),
                element: Box::new(arg(index)?),
            },
            ReturnShape::ElementOf(index) => arg(index)?,
            ReturnShape::Int64 => Type::Int64,
            ReturnShape::Bool => Type::Bool,
        })
    }

    /// Expected parameter types and return type of the lambda at `position`.
    ///
    /// A return type of `None` means any type is accepted. For collection
    /// selectors the expected return type is the enumerable of the
    /// collection element.
    pub fn lambda_signature(
        &self,
        type_args: &[Type],
        position: usize,
    ) -> Option<(Vec<Type>, Option<Type>)> {
        let t = |i: usize| type_args.get(i).cloned();
        let source = t(0)?;

        let shape = self.params.get(position)?;
        if *shape == IndexedLambda {
            let ret = match self.op {
                SequenceOp::Where => Some(Type::Bool),
                SequenceOp::Select => t(1),
                SequenceOp::SelectMany => t(1).map(Type::enumerable),
                _ => None,
            };
            return Some((vec![source, Type::Int64], ret));
        }

        match (self.op, position) {
            (SequenceOp::Where | SequenceOp::Count | SequenceOp::Any, 1)
            | (SequenceOp::First | SequenceOp::FirstOrDefault, 1) => {
                Some((vec![source], Some(Type::Bool)))
            }
            (SequenceOp::Select | SequenceOp::OrderBy | SequenceOp::OrderByDescending, 1) => {
                Some((vec![source], t(1)))
            }
            (SequenceOp::SelectMany, 1) => Some((vec![source], t(1).map(Type::enumerable))),
            (SequenceOp::SelectMany, 2) => Some((vec![source, t(1)?], t(2))),
            (SequenceOp::Join | SequenceOp::GroupJoin | SequenceOp::LeftJoin, 2) => {
                Some((vec![source], t(2)))
            }
            (SequenceOp::Join | SequenceOp::GroupJoin | SequenceOp::LeftJoin, 3) => {
                Some((vec![t(1)?], t(2)))
            }
            (SequenceOp::Join | SequenceOp::LeftJoin, 4) => Some((vec![source, t(1)?], t(3))),
            (SequenceOp::GroupJoin, 4) => Some((vec![source, Type::enumerable(t(1)?)], t(3))),
            _ => None,
        }
    }
}

impl std::fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}/{}", self.declaring, self.op, self.arity())
    }
}
