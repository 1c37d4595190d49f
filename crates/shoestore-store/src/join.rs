//! Relational join resolution for select embeds.
//!
//! For rows of table `T` and an embed targeting table `U`:
//! - **to-one**: the rows carry a foreign key to `U` (the `!fk` hint,
//!   `<alias>_id` for an explicit alias, or `<singular(U)>_id`); the `U` row
//!   with that `id` is attached, or `null`. The choice is made once per
//!   embed, so a row missing the key still gets `null`, never an array.
//! - **to-many**: otherwise every `U` row whose `<singular(T)>_id` (or the
//!   `!fk` hint) equals the row's `id` is attached, possibly `[]`.
//!
//! Nested embeds are resolved on `U` rows first. Projection to the selected
//! columns happens last so key columns stay available while matching.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tracing::debug;

use crate::Row;
use crate::error::StoreError;
use crate::select::{Columns, Embed, SelectSpec};
use crate::table::TableStore;
use crate::value::values_equal;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Attaches related rows from sibling tables.
pub struct JoinResolver<'a> {
    tables: &'a TableStore,
}

impl<'a> JoinResolver<'a> {
    pub const fn new(tables: &'a TableStore) -> Self {
        Self { tables }
    }

    /// Attach every embed of `spec` to `rows` (of `table`), then project.
    pub async fn resolve(
        &self,
        table: &str,
        rows: Vec<Row>,
        spec: &SelectSpec,
    ) -> Result<Vec<Row>, StoreError> {
        let rows = self.attach(table, rows, spec).await?;
        Ok(rows.into_iter().map(|row| project(row, spec)).collect())
    }

    fn attach<'s>(
        &'s self,
        table: &'s str,
        mut rows: Vec<Row>,
        spec: &'s SelectSpec,
    ) -> BoxFuture<'s, Result<Vec<Row>, StoreError>> {
        Box::pin(async move {
            for embed in &spec.embeds {
                let related = self.tables.read(&embed.table).await?;
                let related = self.attach(&embed.table, related, &embed.spec).await?;
                let link = Link::infer(table, &rows, embed);
                debug!(
                    table,
                    embed = %embed.alias,
                    target = %embed.table,
                    link = ?link,
                    candidates = related.len(),
                    "Resolving embed"
                );
                for row in &mut rows {
                    let value = link.value(row, &related);
                    row.insert(embed.alias.clone(), value);
                }
            }
            Ok(rows)
        })
    }
}

/// How an embed relates to its parent table; decided once per embed.
#[derive(Debug, PartialEq, Eq)]
enum Link {
    /// Parent rows carry this foreign-key column.
    ToOne(String),
    /// Related rows point back through this column.
    ToMany(String),
}

impl Link {
    /// To-one when any parent row carries a candidate key column (the `!fk`
    /// hint, `<alias>_id` for an explicit alias, `<singular(U)>_id`).
    fn infer(parent_table: &str, rows: &[Row], embed: &Embed) -> Self {
        let mut candidates = Vec::with_capacity(3);
        if let Some(hint) = &embed.fk_hint {
            candidates.push(hint.clone());
        }
        if embed.explicit_alias {
            candidates.push(format!("{}_id", embed.alias));
        }
        candidates.push(format!("{}_id", singular(&embed.table)));

        candidates
            .into_iter()
            .find(|c| rows.iter().any(|row| row.contains_key(c)))
            .map_or_else(
                || {
                    Self::ToMany(
                        embed
                            .fk_hint
                            .clone()
                            .unwrap_or_else(|| format!("{}_id", singular(parent_table))),
                    )
                },
                Self::ToOne,
            )
    }

    /// Related value for one parent row.
    fn value(&self, row: &Row, related: &[Row]) -> Value {
        match self {
            Self::ToOne(fk) => {
                let Some(target) = row.get(fk).filter(|v| !v.is_null()) else {
                    return Value::Null;
                };
                related
                    .iter()
                    .find(|r| r.get("id").is_some_and(|id| values_equal(id, target)))
                    .map_or(Value::Null, |r| Value::Object(r.clone()))
            }
            Self::ToMany(child_column) => {
                let Some(parent_id) = row.get("id").filter(|id| !id.is_null()) else {
                    return Value::Array(Vec::new());
                };
                Value::Array(
                    related
                        .iter()
                        .filter(|r| {
                            r.get(child_column).is_some_and(|v| values_equal(v, parent_id))
                        })
                        .cloned()
                        .map(Value::Object)
                        .collect(),
                )
            }
        }
    }
}

/// `products` -> `product`; names not ending in `s` are unchanged.
pub fn singular(table: &str) -> &str {
    table.strip_suffix('s').unwrap_or(table)
}

/// Keep the selected columns plus embed aliases, recursively.
fn project(mut row: Row, spec: &SelectSpec) -> Row {
    for embed in &spec.embeds {
        if let Some(value) = row.get_mut(&embed.alias) {
            project_value(value, &embed.spec);
        }
    }
    match &spec.columns {
        Columns::All => row,
        Columns::Named(columns) => {
            let mut out = Row::new();
            for (name, source) in columns {
                if let Some(value) = row.get(source) {
                    out.insert(name.clone(), value.clone());
                }
            }
            for embed in &spec.embeds {
                if let Some(value) = row.remove(&embed.alias) {
                    out.insert(embed.alias.clone(), value);
                }
            }
            out
        }
    }
}

fn project_value(value: &mut Value, spec: &SelectSpec) {
    match value {
        Value::Object(row) => *row = project(std::mem::take(row), spec),
        Value::Array(items) => {
            for item in items {
                project_value(item, spec);
            }
        }
        _ => {}
    }
}
