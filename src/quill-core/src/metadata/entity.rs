//! Entity type descriptors.

use serde::{Deserialize, Serialize};

use crate::types::Type;

/// A stored scalar member of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Member name.
    pub name: String,
    /// Member type.
    pub ty: Type,
    /// Whether this member is part of the primary key.
    pub is_key: bool,
}

/// A reference from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    /// Member name.
    pub name: String,
    /// Target entity name.
    pub target: String,
    /// Whether the navigation points to many targets.
    pub is_collection: bool,
}

impl Navigation {
    /// Static type of the navigation member.
    pub fn ty(&self) -> Type {
        let target = Type::entity(self.target.clone());
        if self.is_collection {
            Type::enumerable(target)
        } else {
            target
        }
    }
}

/// Descriptor of a mapped entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    /// Entity name, which is also its runtime type name.
    pub name: String,
    /// Stored members in declaration order.
    pub properties: Vec<Property>,
    /// Navigations to other entities.
    pub navigations: Vec<Navigation>,
}

impl EntityType {
    /// Create an entity type with no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            navigations: Vec::new(),
        }
    }

    /// Add a key member.
    #[must_use]
    pub fn with_key(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.properties.push(Property {
            name: name.into(),
            ty,
            is_key: true,
        });
        self
    }

    /// Add a non-key stored member.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.properties.push(Property {
            name: name.into(),
            ty,
            is_key: false,
        });
        self
    }

    /// Add a navigation.
    #[must_use]
    pub fn with_navigation(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        is_collection: bool,
    ) -> Self {
        self.navigations.push(Navigation {
            name: name.into(),
            target: target.into(),
            is_collection,
        });
        self
    }

    /// Runtime type of instances of this entity.
    pub fn clr_type(&self) -> Type {
        Type::entity(self.name.clone())
    }

    /// Members that must be read from the row buffer to materialize an instance.
    pub fn stored_members(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    /// Primary key members.
    pub fn key(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(|p| p.is_key)
    }

    /// Look up a stored member.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up a navigation.
    pub fn navigation(&self, name: &str) -> Option<&Navigation> {
        self.navigations.iter().find(|n| n.name == name)
    }

    /// Static type of a member, stored or navigation.
    pub fn member_type(&self, name: &str) -> Option<Type> {
        self.property(name)
            .map(|p| p.ty.clone())
            .or_else(|| self.navigation(name).map(Navigation::ty))
    }
}
