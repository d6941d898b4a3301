//! Formal parameters with identity semantics.

use std::sync::atomic::{AtomicU64, Ordering};

use quill_core::Type;

static PARAMETER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a formal parameter.
///
/// Two parameters with the same name are still different parameters; all
/// substitution is keyed by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(u64);

impl ParamId {
    fn next() -> Self {
        Self(PARAMETER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// A formal parameter of a lambda.
#[derive(Debug, Clone)]
pub struct ParameterExpr {
    id: ParamId,
    name: String,
    ty: Type,
}

impl ParameterExpr {
    /// Create a fresh parameter. Every call yields a distinct identity.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            id: ParamId::next(),
            name: name.into(),
            ty,
        }
    }

    /// Identity of this parameter.
    pub const fn id(&self) -> ParamId {
        self.id
    }

    /// Display name; not used for equality.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static type.
    pub const fn ty(&self) -> &Type {
        &self.ty
    }
}

impl PartialEq for ParameterExpr {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ParameterExpr {}

impl std::hash::Hash for ParameterExpr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
