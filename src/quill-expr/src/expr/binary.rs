//! Binary and unary operators.

use quill_core::Type;
use serde::{Deserialize, Serialize};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic operators
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Subtract,
    /// Multiplication (*)
    Multiply,

    // Comparison operators
    /// Equality (==)
    Equal,
    /// Inequality (!=)
    NotEqual,
    /// Less than (<)
    LessThan,
    /// Greater than (>)
    GreaterThan,

    // Logical operators
    /// Short-circuit AND
    AndAlso,
    /// Short-circuit OR
    OrElse,
}

impl BinaryOp {
    /// Check if this is an arithmetic operator.
    pub const fn is_arithmetic(&self) -> bool {
        matches!(self, Self::Add | Self::Subtract | Self::Multiply)
    }

    /// Check if this is a comparison operator.
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Equal | Self::NotEqual | Self::LessThan | Self::GreaterThan
        )
    }

    /// Check if this is a logical operator.
    pub const fn is_logical(&self) -> bool {
        matches!(self, Self::AndAlso | Self::OrElse)
    }

    /// Get the result type of this operator given operand types.
    ///
    /// Returns `None` if the operation is not valid for the given types.
    pub fn result_type(&self, left: &Type, right: &Type) -> Option<Type> {
        match self {
            Self::Add | Self::Subtract | Self::Multiply => match (left, right) {
                (Type::Int64, Type::Int64) => Some(Type::Int64),
                (Type::Float64 | Type::Int64, Type::Float64 | Type::Int64) => Some(Type::Float64),
                (Type::String, Type::String) if *self == Self::Add => Some(Type::String),
                _ => None,
            },
            Self::Equal | Self::NotEqual | Self::LessThan | Self::GreaterThan => {
                left.common_supertype(right).map(|_| Type::Bool)
            }
            Self::AndAlso | Self::OrElse => {
                (*left == Type::Bool && *right == Type::Bool).then_some(Type::Bool)
            }
        }
    }

    /// Get the symbol for this operator.
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::AndAlso => "&&",
            Self::OrElse => "||",
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_types() {
        assert_eq!(
            BinaryOp::Add.result_type(&Type::Int64, &Type::Float64),
            Some(Type::Float64)
        );
        assert_eq!(
            BinaryOp::Equal.result_type(&Type::Int64, &Type::Null),
            Some(Type::Bool)
        );
        assert_eq!(
            BinaryOp::Equal.result_type(&Type::entity("Order"), &Type::Null),
            Some(Type::Bool)
        );
        assert_eq!(BinaryOp::AndAlso.result_type(&Type::Bool, &Type::Int64), None);
        assert_eq!(BinaryOp::Subtract.result_type(&Type::String, &Type::String), None);
    }

    #[test]
    fn test_classification() {
        assert!(BinaryOp::Equal.is_comparison());
        assert!(BinaryOp::OrElse.is_logical());
        assert!(BinaryOp::Multiply.is_arithmetic());
        assert_eq!(BinaryOp::NotEqual.to_string(), "!=");
    }
}
