//! Metadata catalog contract and an in-memory model.

use std::collections::BTreeMap;
use std::sync::Arc;

use common_error::{QuillError, QuillResult};

use super::EntityType;

/// Lookup of mapped entity types.
pub trait MetadataCatalog: std::fmt::Debug + Send + Sync {
    /// Find an entity type by its runtime type name.
    fn find_entity_type(&self, name: &str) -> Option<Arc<EntityType>>;

    /// Resolve an entity type, failing when it is not mapped.
    fn entity_type(&self, name: &str) -> QuillResult<Arc<EntityType>> {
        self.find_entity_type(name)
            .ok_or_else(|| QuillError::metadata(format!("entity type '{name}' is not mapped")))
    }
}

/// A set of mapped entity types.
#[derive(Debug, Clone, Default)]
pub struct Model {
    entity_types: BTreeMap<String, Arc<EntityType>>,
}

impl Model {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity type, replacing one with the same name.
    #[must_use]
    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_types
            .insert(entity_type.name.clone(), Arc::new(entity_type));
        self
    }

    /// Iterate over the mapped entity types in name order.
    pub fn entity_types(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.entity_types.values()
    }
}

impl MetadataCatalog for Model {
    fn find_entity_type(&self, name: &str) -> Option<Arc<EntityType>> {
        self.entity_types.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn test_model_lookup() {
        let model = Model::new()
            .with_entity_type(EntityType::new("Customer").with_key("Id", Type::Int64))
            .with_entity_type(EntityType::new("Order").with_key("Id", Type::Int64));

        assert_eq!(model.entity_types().count(), 2);
        assert!(model.find_entity_type("Customer").is_some());
        assert!(model.entity_type("Order").is_ok());

        let err = model.entity_type("Invoice").unwrap_err();
        assert_eq!(err.to_string(), "MetadataError: entity type 'Invoice' is not mapped");
    }
}
