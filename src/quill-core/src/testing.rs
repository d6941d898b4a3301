//! Test fixtures shared by the Quill crates.
//!
//! Each fixture pairs a metadata [`Model`] with in-memory rows per entity so
//! that trees can be evaluated before and after simplification.

use std::collections::BTreeMap;

use crate::metadata::{EntityType, Model};
use crate::types::{Type, Value};

/// A model together with the rows stored for each of its entities.
#[derive(Debug, Clone, Default)]
pub struct Fixture {
    /// Mapped entity types.
    pub model: Model,
    /// Rows per entity name.
    pub rows: BTreeMap<String, Vec<Value>>,
}

impl Fixture {
    /// Create an empty fixture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Two entities joined by key: `Outer` rows `[1, 2, 3]` and `Inner` rows
    /// whose `Key` column is `[1, 1, 2]`.
    pub fn keyed() -> Self {
        let mut fixture = Self::new()
            .with_entity_type(EntityType::new("Outer").with_key("Id", Type::Int64))
            .with_entity_type(
                EntityType::new("Inner")
                    .with_key("Id", Type::Int64)
                    .with_property("Key", Type::Int64),
            );

        for id in 1..=3 {
            fixture.add_row("Outer", [("Id", Value::Int64(id))]);
        }
        for (id, key) in [(10, 1), (11, 1), (12, 2)] {
            fixture.add_row("Inner", [("Id", Value::Int64(id)), ("Key", Value::Int64(key))]);
        }

        fixture
    }

    /// Customers with their orders, including a customer without orders and
    /// an order whose customer does not exist.
    pub fn customer_orders() -> Self {
        let mut fixture = Self::new()
            .with_entity_type(
                EntityType::new("Customer")
                    .with_key("Id", Type::Int64)
                    .with_property("Name", Type::String)
                    .with_property("City", Type::String)
                    .with_navigation("Orders", "Order", true),
            )
            .with_entity_type(
                EntityType::new("Order")
                    .with_key("Id", Type::Int64)
                    .with_property("CustomerId", Type::Int64)
                    .with_property("Amount", Type::Float64)
                    .with_navigation("Customer", "Customer", false),
            );

        for (id, name, city) in [(1, "Alice", "London"), (2, "Bob", "Paris"), (3, "Carol", "London")] {
            fixture.add_row(
                "Customer",
                [
                    ("Id", Value::Int64(id)),
                    ("Name", Value::from(name)),
                    ("City", Value::from(city)),
                ],
            );
        }
        for (id, customer, amount) in [(100, 1, 10.0), (101, 1, 25.0), (102, 2, 5.0), (103, 4, 1.0)] {
            fixture.add_row(
                "Order",
                [
                    ("Id", Value::Int64(id)),
                    ("CustomerId", Value::Int64(customer)),
                    ("Amount", Value::Float64(amount)),
                ],
            );
        }

        fixture
    }

    /// Add an entity type to the model.
    #[must_use]
    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.rows.entry(entity_type.name.clone()).or_default();
        self.model = self.model.with_entity_type(entity_type);
        self
    }

    /// Append a row to an entity.
    pub fn add_row<'a>(
        &mut self,
        entity: &str,
        fields: impl IntoIterator<Item = (&'a str, Value)>,
    ) {
        let row = Value::record(entity, fields);
        self.rows.entry(entity.to_string()).or_default().push(row);
    }

    /// Rows stored for an entity.
    pub fn rows(&self, entity: &str) -> &[Value] {
        self.rows.get(entity).map_or(&[], Vec::as_slice)
    }
}
