//! Row-buffer bindings and entity shapers.

use std::sync::Arc;

use quill_core::{EntityType, Type};

use common_error::{QuillError, QuillResult};

use super::{Expr, ExprKind};

/// A member path in a named projection, e.g. `Outer.Customer`.
///
/// The empty path names the projection root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProjectionMember(Vec<String>);

impl ProjectionMember {
    /// The projection root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Extend the path by one member.
    #[must_use]
    pub fn append(&self, member: impl Into<String>) -> Self {
        let mut path = self.0.clone();
        path.push(member.into());
        Self(path)
    }

    /// Path segments.
    pub fn path(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for ProjectionMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0.join("."))
        }
    }
}

/// How a binding locates its slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProjectionBinding {
    /// By member path in a named projection.
    Member(ProjectionMember),
    /// By position in a positional projection.
    Index(usize),
}

/// A read of one slot of the row buffer produced by a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectionBindingExpr {
    binding: ProjectionBinding,
    ty: Type,
}

impl ProjectionBindingExpr {
    /// Bind by member path.
    pub fn member(member: ProjectionMember, ty: Type) -> Self {
        Self {
            binding: ProjectionBinding::Member(member),
            ty,
        }
    }

    /// Bind by position.
    pub fn index(index: usize, ty: Type) -> Self {
        Self {
            binding: ProjectionBinding::Index(index),
            ty,
        }
    }

    /// Slot locator.
    pub const fn binding(&self) -> &ProjectionBinding {
        &self.binding
    }

    /// Type of the slot.
    pub const fn ty(&self) -> &Type {
        &self.ty
    }
}

impl std::fmt::Display for ProjectionBindingExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.binding {
            ProjectionBinding::Member(member) => write!(f, "ProjectionBinding({member})"),
            ProjectionBinding::Index(index) => write!(f, "ProjectionBinding(#{index})"),
        }
    }
}

/// Materializes an entity instance from a row buffer.
///
/// The value buffer is always a projection binding; the shaper's type is the
/// entity's runtime type.
#[derive(Debug, Clone)]
pub struct EntityShaperExpr {
    entity_type: Arc<EntityType>,
    value_buffer: Expr,
    nullable: bool,
}

impl EntityShaperExpr {
    /// Create a shaper reading `entity_type` from `value_buffer`.
    pub fn new(entity_type: Arc<EntityType>, value_buffer: Expr, nullable: bool) -> QuillResult<Self> {
        check_value_buffer(&value_buffer)?;
        Ok(Self {
            entity_type,
            value_buffer,
            nullable,
        })
    }

    /// Entity being materialized.
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Binding to the row buffer.
    pub const fn value_buffer(&self) -> &Expr {
        &self.value_buffer
    }

    /// Whether the shaper may produce `null` (the optional side of a left join).
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Runtime type of the produced instance.
    pub fn ty(&self) -> Type {
        self.entity_type.clr_type()
    }

    /// A copy reading from another binding.
    pub fn with_value_buffer(&self, value_buffer: Expr) -> QuillResult<Self> {
        Self::new(self.entity_type.clone(), value_buffer, self.nullable)
    }

    /// A copy with a different nullability.
    #[must_use]
    pub fn with_nullable(&self, nullable: bool) -> Self {
        Self {
            nullable,
            ..self.clone()
        }
    }
}

fn check_value_buffer(value_buffer: &Expr) -> QuillResult<()> {
    match value_buffer.kind() {
        ExprKind::ProjectionBinding(binding) if *binding.ty() == Type::ValueBuffer => Ok(()),
        _ => Err(QuillError::type_error(format!(
            "entity shaper value buffer must be a row-buffer binding, got {value_buffer}"
        ))),
    }
}

impl Expr {
    /// Point an entity shaper at another binding.
    ///
    /// Returns this same node when the binding is unchanged.
    pub fn update_value_buffer(&self, value_buffer: Self) -> QuillResult<Self> {
        let ExprKind::EntityShaper(shaper) = self.kind() else {
            return Err(QuillError::type_error(format!("{self} is not an entity shaper")));
        };
        if shaper.value_buffer().ptr_eq(&value_buffer) {
            return Ok(self.clone());
        }
        Ok(Self::entity_shaper(shaper.with_value_buffer(value_buffer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> Arc<EntityType> {
        Arc::new(EntityType::new("Customer").with_key("Id", Type::Int64))
    }

    fn binding(member: &str) -> Expr {
        Expr::projection_binding(ProjectionBindingExpr::member(
            ProjectionMember::root().append(member),
            Type::ValueBuffer,
        ))
    }

    #[test]
    fn test_shaper_requires_binding() {
        assert!(EntityShaperExpr::new(customer(), binding("Outer"), false).is_ok());
        assert!(EntityShaperExpr::new(customer(), Expr::constant(1i64), false).is_err());

        let int_slot = Expr::projection_binding(ProjectionBindingExpr::index(0, Type::Int64));
        assert!(EntityShaperExpr::new(customer(), int_slot, false).is_err());
    }

    #[test]
    fn test_update_preserves_identity() {
        let buffer = binding("Outer");
        let shaper =
            Expr::entity_shaper(EntityShaperExpr::new(customer(), buffer.clone(), true).unwrap());

        let same = shaper.update_value_buffer(buffer).unwrap();
        assert!(same.ptr_eq(&shaper));

        let moved = shaper.update_value_buffer(binding("Inner")).unwrap();
        assert!(!moved.ptr_eq(&shaper));
        assert_eq!(moved.ty(), Type::entity("Customer"));
        assert_eq!(
            moved.to_string(),
            "EntityShaper<Customer>(ProjectionBinding(Inner), nullable: true)"
        );
    }

    #[test]
    fn test_update_on_other_node() {
        assert!(Expr::constant(1i64).update_value_buffer(binding("Outer")).is_err());
    }
}
