//! Chainable query builder over the mock store.
//!
//! A [`QueryBuilder`] only accumulates its request; nothing touches storage
//! until it is awaited (or [`QueryBuilder::execute`] is called). Filters,
//! `select` and the mutation may therefore be declared in any order:
//!
//! ```ignore
//! let rows = db.from("products").eq("active", true).order("name", true).await?;
//! let row = db.from("profiles").select("*").eq("id", user_id).single().await?;
//! db.from("product_variants").update(json!({"stock": 3})).eq("id", "var-001").await?;
//! ```

use std::future::{Future, IntoFuture};
use std::pin::Pin;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use shoestore_core::db::now_rfc3339;

use crate::Row;
use crate::error::StoreError;
use crate::join::JoinResolver;
use crate::select::SelectSpec;
use crate::table::TableStore;
use crate::value::{compare, like_regex, match_text, sort_order, values_equal};

/// Outcome of an evaluated query: data on success, a typed error otherwise.
pub type QueryResult = Result<QueryData, StoreError>;

/// Payload of a successful query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Rows(Vec<Row>),
    Row(Row),
    /// `maybe_single()` matched nothing.
    Empty,
}

impl QueryData {
    /// All rows, whatever the cardinality.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows(rows) => rows,
            Self::Row(row) => vec![row],
            Self::Empty => Vec::new(),
        }
    }

    /// The single row, or the first of many.
    pub fn into_row(self) -> Option<Row> {
        match self {
            Self::Rows(rows) => rows.into_iter().next(),
            Self::Row(row) => Some(row),
            Self::Empty => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Row(_) => 1,
            Self::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deserialize the single row into `T`.
    pub fn parse_row<T: DeserializeOwned>(self) -> Result<Option<T>, StoreError> {
        self.into_row()
            .map(|row| serde_json::from_value(Value::Object(row)))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Deserialize every row into `T`.
    pub fn parse_rows<T: DeserializeOwned>(self) -> Result<Vec<T>, StoreError> {
        self.into_rows()
            .into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)).map_err(StoreError::from))
            .collect()
    }
}

/// Entry point of the mock relational API.
#[derive(Clone)]
pub struct MockDatabase {
    tables: TableStore,
}

impl MockDatabase {
    pub const fn new(tables: TableStore) -> Self {
        Self { tables }
    }

    /// Start a query against `table`.
    pub fn from(&self, table: &str) -> QueryBuilder {
        QueryBuilder::new(self.tables.clone(), table)
    }

    pub const fn tables(&self) -> &TableStore {
        &self.tables
    }
}

/// One filter predicate, evaluated lazily at execution time.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// `None` when the pattern could not be compiled: matches nothing.
    ILike(String, Option<Regex>),
    In(String, Vec<Value>),
    IsNull(String),
}

impl Filter {
    pub fn matches(&self, row: &Row) -> bool {
        let field = |column: &String| row.get(column).unwrap_or(&Value::Null);
        match self {
            Self::Eq(c, v) => values_equal(field(c), v),
            Self::Neq(c, v) => !values_equal(field(c), v),
            Self::Gt(c, v) => compare(field(c), v).is_some_and(std::cmp::Ordering::is_gt),
            Self::Gte(c, v) => compare(field(c), v).is_some_and(std::cmp::Ordering::is_ge),
            Self::Lt(c, v) => compare(field(c), v).is_some_and(std::cmp::Ordering::is_lt),
            Self::Lte(c, v) => compare(field(c), v).is_some_and(std::cmp::Ordering::is_le),
            Self::ILike(c, re) => match (re, match_text(field(c))) {
                (Some(re), Some(text)) => re.is_match(&text),
                _ => false,
            },
            Self::In(c, values) => values.iter().any(|v| values_equal(field(c), v)),
            Self::IsNull(c) => field(c).is_null(),
        }
    }
}

#[derive(Debug, Clone)]
struct Order {
    column: String,
    ascending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cardinality {
    Many,
    Single,
    MaybeSingle,
}

#[derive(Debug, Clone)]
enum Mutation {
    Insert { payload: Value },
    Update { patch: Value },
    Upsert { payload: Value, on_conflict: String },
    Delete,
}

/// Accumulated request against one table.
#[must_use = "a query does nothing until it is awaited"]
pub struct QueryBuilder {
    tables: TableStore,
    table: String,
    select: Option<String>,
    filters: Vec<Filter>,
    order: Option<Order>,
    limit: Option<usize>,
    offset: usize,
    cardinality: Cardinality,
    mutation: Option<Mutation>,
}

impl QueryBuilder {
    fn new(tables: TableStore, table: &str) -> Self {
        Self {
            tables,
            table: table.to_string(),
            select: None,
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: 0,
            cardinality: Cardinality::Many,
            mutation: None,
        }
    }

    /// Columns and join directives to return (see [`SelectSpec`]).
    pub fn select(mut self, spec: &str) -> Self {
        self.select = Some(spec.to_string());
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(column.to_string(), value.into()))
    }

    pub fn neq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Neq(column.to_string(), value.into()))
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gt(column.to_string(), value.into()))
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gte(column.to_string(), value.into()))
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lt(column.to_string(), value.into()))
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lte(column.to_string(), value.into()))
    }

    /// Case-insensitive pattern match; `%` is a wildcard.
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        let re = like_regex(pattern)
            .inspect_err(|e| warn!(column, pattern, error = %e, "Unusable ilike pattern"))
            .ok();
        self.filter(Filter::ILike(column.to_string(), re))
    }

    pub fn in_list<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(Filter::In(column.to_string(), values))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(Filter::IsNull(column.to_string()))
    }

    /// Add an arbitrary predicate.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Inclusive row range, zero-based.
    pub fn range(mut self, from: usize, to: usize) -> Self {
        self.offset = from;
        self.limit = Some(to.saturating_sub(from).saturating_add(1));
        self
    }

    /// Expect exactly one row; zero rows is [`StoreError::NotFound`].
    pub fn single(mut self) -> Self {
        self.cardinality = Cardinality::Single;
        self
    }

    /// Expect at most one row; zero rows is [`QueryData::Empty`].
    pub fn maybe_single(mut self) -> Self {
        self.cardinality = Cardinality::MaybeSingle;
        self
    }

    /// Insert an object (returns one row) or an array of objects.
    pub fn insert(mut self, payload: Value) -> Self {
        self.mutation = Some(Mutation::Insert { payload });
        self
    }

    /// Insert a single row; the result is that row.
    pub fn insert_one(self, row: Row) -> Self {
        self.insert(Value::Object(row))
    }

    /// Merge `patch` into every row matching the filters.
    pub fn update(mut self, patch: Value) -> Self {
        self.mutation = Some(Mutation::Update { patch });
        self
    }

    /// Update the row whose `on_conflict` column matches, else insert.
    pub fn upsert(mut self, payload: Value, on_conflict: &str) -> Self {
        self.mutation = Some(Mutation::Upsert {
            payload,
            on_conflict: on_conflict.to_string(),
        });
        self
    }

    /// Remove every row matching the filters.
    pub fn delete(mut self) -> Self {
        self.mutation = Some(Mutation::Delete);
        self
    }

    /// Evaluate the request.
    pub async fn execute(mut self) -> QueryResult {
        let spec = match self.select.as_deref() {
            Some(raw) => SelectSpec::parse(raw)?,
            None => SelectSpec::all(),
        };
        debug!(
            table = %self.table,
            filters = self.filters.len(),
            mutation = ?self.mutation.as_ref().map(Mutation::name),
            "Executing query"
        );
        match self.mutation.take() {
            None => self.run_select(&spec).await,
            Some(Mutation::Insert { payload }) => self.run_insert(payload, &spec).await,
            Some(Mutation::Update { patch }) => self.run_update(patch, &spec).await,
            Some(Mutation::Upsert {
                payload,
                on_conflict,
            }) => self.run_upsert(payload, &on_conflict, &spec).await,
            Some(Mutation::Delete) => self.run_delete(&spec).await,
        }
    }

    fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    async fn run_select(&self, spec: &SelectSpec) -> QueryResult {
        let mut rows: Vec<Row> = self
            .tables
            .read(&self.table)
            .await?
            .into_iter()
            .filter(|row| self.matches(row))
            .collect();

        if let Some(order) = &self.order {
            rows.sort_by(|a, b| {
                sort_order(a.get(&order.column), b.get(&order.column), order.ascending)
            });
        }

        let rows: Vec<Row> = rows
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();

        let rows = JoinResolver::new(&self.tables).resolve(&self.table, rows, spec).await?;
        self.shape(rows)
    }

    async fn run_insert(&self, payload: Value, spec: &SelectSpec) -> QueryResult {
        let scalar = payload.is_object();
        let new_rows = rows_from_payload(payload)?;
        let now = now_rfc3339();

        let guard = self.tables.lock(&self.table).await;
        let mut rows = self.tables.read_locked(&self.table, &guard).await?;
        let mut inserted = Vec::with_capacity(new_rows.len());
        for mut row in new_rows {
            stamp_new(&mut row, &now);
            rows.push(row.clone());
            inserted.push(row);
        }
        self.tables.write(&self.table, &rows).await?;
        drop(guard);
        debug!(table = %self.table, inserted = inserted.len(), "Rows inserted");

        let inserted = JoinResolver::new(&self.tables)
            .resolve(&self.table, inserted, spec)
            .await?;
        if scalar || self.cardinality != Cardinality::Many {
            return self.shape_one(inserted);
        }
        Ok(QueryData::Rows(inserted))
    }

    async fn run_update(&self, patch: Value, spec: &SelectSpec) -> QueryResult {
        let Value::Object(patch) = patch else {
            return Err(StoreError::InvalidRow("update patch must be an object".into()));
        };
        let now = now_rfc3339();

        let guard = self.tables.lock(&self.table).await;
        let mut rows = self.tables.read_locked(&self.table, &guard).await?;
        let mut updated = Vec::new();
        for row in &mut rows {
            if !self.matches(row) {
                continue;
            }
            for (key, value) in &patch {
                row.insert(key.clone(), value.clone());
            }
            row.insert("updated_at".to_string(), Value::String(now.clone()));
            updated.push(row.clone());
        }
        self.tables.write(&self.table, &rows).await?;
        drop(guard);
        debug!(table = %self.table, updated = updated.len(), "Rows updated");

        // Plural updates return the whole table; single ones the matched row.
        let result = if self.cardinality == Cardinality::Many {
            rows
        } else {
            updated
        };
        let result = JoinResolver::new(&self.tables)
            .resolve(&self.table, result, spec)
            .await?;
        self.shape(result)
    }

    async fn run_upsert(&self, payload: Value, on_conflict: &str, spec: &SelectSpec) -> QueryResult {
        let Value::Object(mut incoming) = payload else {
            return Err(StoreError::InvalidRow("upsert payload must be an object".into()));
        };
        let key = incoming.get(on_conflict).cloned().ok_or_else(|| {
            StoreError::InvalidRow(format!("upsert payload lacks conflict column {on_conflict}"))
        })?;
        let now = now_rfc3339();

        let guard = self.tables.lock(&self.table).await;
        let mut rows = self.tables.read_locked(&self.table, &guard).await?;
        let existing = rows
            .iter()
            .position(|row| row.get(on_conflict).is_some_and(|v| values_equal(v, &key)));
        let row = if let Some(index) = existing {
            let row = &mut rows[index];
            incoming.remove("id");
            incoming.remove("created_at");
            for (k, v) in incoming {
                row.insert(k, v);
            }
            row.insert("updated_at".to_string(), Value::String(now));
            row.clone()
        } else {
            stamp_new(&mut incoming, &now);
            rows.push(incoming.clone());
            incoming
        };
        self.tables.write(&self.table, &rows).await?;
        drop(guard);
        debug!(table = %self.table, on_conflict, "Row upserted");

        let rows = JoinResolver::new(&self.tables)
            .resolve(&self.table, vec![row], spec)
            .await?;
        self.shape_one(rows)
    }

    async fn run_delete(&self, spec: &SelectSpec) -> QueryResult {
        let guard = self.tables.lock(&self.table).await;
        let (removed, kept): (Vec<Row>, Vec<Row>) = self
            .tables
            .read_locked(&self.table, &guard)
            .await?
            .into_iter()
            .partition(|row| self.matches(row));
        self.tables.write(&self.table, &kept).await?;
        drop(guard);
        debug!(table = %self.table, removed = removed.len(), "Rows deleted");

        let removed = JoinResolver::new(&self.tables)
            .resolve(&self.table, removed, spec)
            .await?;
        self.shape(removed)
    }

    /// Apply the requested cardinality to a result set.
    fn shape(&self, rows: Vec<Row>) -> QueryResult {
        match self.cardinality {
            Cardinality::Many => Ok(QueryData::Rows(rows)),
            Cardinality::Single | Cardinality::MaybeSingle => self.shape_one(rows),
        }
    }

    fn shape_one(&self, mut rows: Vec<Row>) -> QueryResult {
        match rows.len() {
            0 if self.cardinality == Cardinality::MaybeSingle => Ok(QueryData::Empty),
            0 => Err(StoreError::NotFound {
                table: self.table.clone(),
            }),
            1 => Ok(QueryData::Row(rows.remove(0))),
            count => Err(StoreError::MultipleRows {
                table: self.table.clone(),
                count,
            }),
        }
    }
}

impl IntoFuture for QueryBuilder {
    type Output = QueryResult;
    type IntoFuture = Pin<Box<dyn Future<Output = QueryResult> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.execute())
    }
}

impl Mutation {
    const fn name(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Upsert { .. } => "upsert",
            Self::Delete => "delete",
        }
    }
}

fn rows_from_payload(payload: Value) -> Result<Vec<Row>, StoreError> {
    match payload {
        Value::Object(row) => Ok(vec![row]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(StoreError::InvalidRow(format!("expected object, got {other}"))),
            })
            .collect(),
        other => Err(StoreError::InvalidRow(format!(
            "expected object or array, got {other}"
        ))),
    }
}

/// Give a new row an id and timestamps unless it already carries them.
fn stamp_new(row: &mut Row, now: &str) {
    fn missing(row: &Row, key: &str) -> bool {
        row.get(key).is_none_or(Value::is_null)
    }
    if missing(row, "id") {
        row.insert(
            "id".to_string(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
    }
    for key in ["created_at", "updated_at"] {
        if missing(row, key) {
            row.insert(key.to_string(), Value::String(now.to_string()));
        }
    }
}
