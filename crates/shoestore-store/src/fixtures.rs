//! Seed data applied on the first read of a table that has never been
//! persisted.

use std::collections::HashMap;

use serde_json::{Value, json};

use crate::Row;

/// Per-table seed rows.
#[derive(Debug, Clone, Default)]
pub struct Fixtures {
    tables: HashMap<String, Vec<Row>>,
}

impl Fixtures {
    /// No seed data: every table starts empty.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Demo catalogue for a shoe store.
    pub fn shoe_store() -> Self {
        let mut fixtures = Self::empty();
        fixtures.insert_value("profiles", profiles());
        fixtures.insert_value("suppliers", suppliers());
        fixtures.insert_value("products", products());
        fixtures.insert_value("product_variants", product_variants());
        fixtures.insert_value("customers", customers());
        fixtures
    }

    /// Replace the seed for `table`.
    pub fn insert(&mut self, table: &str, rows: Vec<Row>) {
        self.tables.insert(table.to_string(), rows);
    }

    /// Builder-style [`Fixtures::insert`].
    #[must_use]
    pub fn with_table(mut self, table: &str, rows: Vec<Row>) -> Self {
        self.insert(table, rows);
        self
    }

    /// Seed rows for `table` (empty when the table has no fixture).
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.get(table).cloned().unwrap_or_default()
    }

    fn insert_value(&mut self, table: &str, value: Value) {
        let rows = match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(row) => Some(row),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        self.insert(table, rows);
    }
}

const SEEDED_AT: &str = "2024-01-15T10:00:00.000Z";

// The admin row predates the `full_name` column and is repaired on read.
fn profiles() -> Value {
    json!([
        {
            "id": "user-admin-001",
            "email": "admin@zapateria.com",
            "role": "admin",
            "created_at": SEEDED_AT,
            "updated_at": SEEDED_AT
        },
        {
            "id": "user-vendedor-001",
            "email": "ventas@zapateria.com",
            "full_name": "María Ventas",
            "role": "vendedor",
            "created_at": SEEDED_AT,
            "updated_at": SEEDED_AT
        }
    ])
}

fn suppliers() -> Value {
    json!([
        {
            "id": "sup-001",
            "name": "Calzados del Norte",
            "contact_name": "Jorge Ruiz",
            "phone": "555-0101",
            "created_at": SEEDED_AT,
            "updated_at": SEEDED_AT
        },
        {
            "id": "sup-002",
            "name": "Deportivos Andinos",
            "contact_name": "Lucía Paredes",
            "phone": "555-0202",
            "created_at": SEEDED_AT,
            "updated_at": SEEDED_AT
        }
    ])
}

fn products() -> Value {
    json!([
        {
            "id": "prod-001",
            "name": "Zapatilla Runner Pro",
            "brand": "Andina",
            "category": "deportivo",
            "supplier_id": "sup-002",
            "base_price": 89.9,
            "active": true,
            "created_at": SEEDED_AT,
            "updated_at": SEEDED_AT
        },
        {
            "id": "prod-002",
            "name": "Mocasín Clásico",
            "brand": "Norteño",
            "category": "formal",
            "supplier_id": "sup-001",
            "base_price": 120.0,
            "active": true,
            "created_at": SEEDED_AT,
            "updated_at": SEEDED_AT
        }
    ])
}

fn product_variants() -> Value {
    json!([
        {
            "id": "var-001",
            "product_id": "prod-001",
            "size": "40",
            "color": "negro",
            "sku": "RUN-40-NEG",
            "stock": 12,
            "created_at": SEEDED_AT,
            "updated_at": SEEDED_AT
        },
        {
            "id": "var-002",
            "product_id": "prod-001",
            "size": "42",
            "color": "blanco",
            "sku": "RUN-42-BLA",
            "stock": 7,
            "created_at": SEEDED_AT,
            "updated_at": SEEDED_AT
        },
        {
            "id": "var-003",
            "product_id": "prod-002",
            "size": "41",
            "color": "marrón",
            "sku": "MOC-41-MAR",
            "stock": 4,
            "created_at": SEEDED_AT,
            "updated_at": SEEDED_AT
        }
    ])
}

fn customers() -> Value {
    json!([
        {
            "id": "cust-001",
            "full_name": "Cliente Mostrador",
            "document": "00000000",
            "created_at": SEEDED_AT,
            "updated_at": SEEDED_AT
        }
    ])
}
