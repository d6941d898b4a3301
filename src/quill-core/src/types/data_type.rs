//! Static types of expression nodes.

use serde::{Deserialize, Serialize};

/// Name of the record type pairing an outer row with an inner row.
pub const TRANSPARENT_IDENTIFIER: &str = "TransparentIdentifier";

/// Whether a sequence is evaluated in memory or translated for a remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequenceKind {
    /// In-memory sequence (`IEnumerable<T>`).
    Enumerable,
    /// Translatable sequence (`IQueryable<T>`).
    Queryable,
}

/// A named record with ordered fields.
///
/// Records model anonymous projections, transparent identifiers and the
/// shape of materialized rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordType {
    /// Record name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<(String, Type)>,
}

impl RecordType {
    /// Create a new record type.
    pub fn new<N: Into<String>>(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (N, Type)>,
    ) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(|(n, t)| (n.into(), t)).collect(),
        }
    }

    /// Look up the type of a field.
    pub fn field(&self, name: &str) -> Option<&Type> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

/// Static type of an expression.
///
/// Every value type is nullable at this layer: a `null` constant may flow
/// wherever a non-function type is expected, matching relational semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Type of an untyped `null` literal.
    Null,
    /// Boolean type.
    Bool,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// A mapped entity, by runtime type name.
    Entity(String),
    /// A named record.
    Record(RecordType),
    /// A sequence of elements.
    Sequence {
        /// Enumerable or queryable.
        kind: SequenceKind,
        /// Element type.
        element: Box<Self>,
    },
    /// A lambda signature.
    Function {
        /// Parameter types.
        params: Vec<Self>,
        /// Return type.
        ret: Box<Self>,
    },
    /// A row buffer read by entity shapers.
    ValueBuffer,
}

impl Type {
    /// Create an entity type reference.
    pub fn entity(name: impl Into<String>) -> Self {
        Self::Entity(name.into())
    }

    /// Create an in-memory sequence type.
    pub fn enumerable(element: Self) -> Self {
        Self::Sequence {
            kind: SequenceKind::Enumerable,
            element: Box::new(element),
        }
    }

    /// Create a translatable sequence type.
    pub fn queryable(element: Self) -> Self {
        Self::Sequence {
            kind: SequenceKind::Queryable,
            element: Box::new(element),
        }
    }

    /// Create a function type.
    pub fn function(params: Vec<Self>, ret: Self) -> Self {
        Self::Function {
            params,
            ret: Box::new(ret),
        }
    }

    /// Create a record type.
    pub fn record<N: Into<String>>(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (N, Type)>,
    ) -> Self {
        Self::Record(RecordType::new(name, fields))
    }

    /// The record pairing an outer element with an inner element.
    pub fn transparent_identifier(outer: Self, inner: Self) -> Self {
        Self::record(TRANSPARENT_IDENTIFIER, [("Outer", outer), ("Inner", inner)])
    }

    /// The element type if this is a sequence.
    pub fn sequence_element(&self) -> Option<&Self> {
        match self {
            Self::Sequence { element, .. } => Some(element),
            _ => None,
        }
    }

    /// The sequence kind if this is a sequence.
    pub const fn sequence_kind(&self) -> Option<SequenceKind> {
        match self {
            Self::Sequence { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Check if this is a sequence type.
    pub const fn is_sequence(&self) -> bool {
        matches!(self, Self::Sequence { .. })
    }

    /// Check if this is a function type.
    pub const fn is_function(&self) -> bool {
        matches!(self, Self::Function { .. })
    }

    /// Check if this type is numeric.
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }

    /// The return type if this is a function type.
    pub fn function_return(&self) -> Option<&Self> {
        match self {
            Self::Function { ret, .. } => Some(ret),
            _ => None,
        }
    }

    /// The type of a record field, if this is a record containing it.
    pub fn record_field(&self, name: &str) -> Option<&Self> {
        match self {
            Self::Record(record) => record.field(name),
            _ => None,
        }
    }

    /// Check whether a value of type `other` may be used where `self` is
    /// expected.
    ///
    /// Queryable sequences are enumerable, sequence elements are covariant,
    /// and `Null` flows into every non-function type.
    pub fn is_assignable_from(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }

        match (self, other) {
            (Self::Function { .. }, _) => false,
            (_, Self::Null) => true,
            (Self::Float64, Self::Int64) => true,
            (
                Self::Sequence {
                    kind: target_kind,
                    element: target,
                },
                Self::Sequence {
                    kind: source_kind,
                    element: source,
                },
            ) => {
                (target_kind == source_kind || *target_kind == SequenceKind::Enumerable)
                    && target.is_assignable_from(source)
            }
            _ => false,
        }
    }

    /// Common type of two branches, if any.
    pub fn common_supertype(&self, other: &Self) -> Option<Self> {
        if self.is_assignable_from(other) {
            Some(self.clone())
        } else if other.is_assignable_from(self) {
            Some(other.clone())
        } else {
            None
        }
    }

    /// Get the display name for this type.
    pub fn display_name(&self) -> String {
        match self {
            Self::Null => "Null".to_string(),
            Self::Bool => "Bool".to_string(),
            Self::Int64 => "Int64".to_string(),
            Self::Float64 => "Float64".to_string(),
            Self::String => "String".to_string(),
            Self::Entity(name) => name.clone(),
            Self::Record(record) => record.name.clone(),
            Self::Sequence { kind, element } => match kind {
                SequenceKind::Enumerable => format!("IEnumerable<{}>", element.display_name()),
                SequenceKind::Queryable => format!("IQueryable<{}>", element.display_name()),
            },
            Self::Function { params, ret } => {
                let params = params
                    .iter()
                    .map(Self::display_name)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Func<{params}> -> {}", ret.display_name())
            }
            Self::ValueBuffer => "ValueBuffer".to_string(),
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
