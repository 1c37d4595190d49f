//! Data commands: query, insert, reset.

use std::io::Write;

use serde_json::Value;

use shoestore_store::{MockDatabase, QueryData, TableStore};

/// Arguments of `shoestore query`.
#[derive(clap::Args, Debug)]
pub struct QueryArgs {
    /// Table to read.
    pub table: String,
    /// Columns and embeds, e.g. `*, variants:product_variants(*)`.
    #[arg(long)]
    pub select: Option<String>,
    /// Equality filter; repeatable.
    #[arg(long = "eq", value_name = "COLUMN=VALUE", value_parser = parse_filter)]
    pub eq: Vec<(String, Value)>,
    /// Column to sort by (ascending unless --desc).
    #[arg(long)]
    pub order: Option<String>,
    #[arg(long, requires = "order")]
    pub desc: bool,
    #[arg(long)]
    pub limit: Option<usize>,
    /// Expect exactly one row.
    #[arg(long)]
    pub single: bool,
}

/// Parse `column=value`. The value is JSON when it parses as JSON
/// (`42`, `true`, `null`), a plain string otherwise.
pub fn parse_filter(raw: &str) -> Result<(String, Value), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=VALUE, got {raw:?}"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("missing column in {raw:?}"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((column.to_string(), value))
}

pub async fn query(db: &MockDatabase, args: QueryArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let mut query = db.from(&args.table);
    if let Some(select) = &args.select {
        query = query.select(select);
    }
    for (column, value) in args.eq {
        query = query.eq(&column, value);
    }
    if let Some(column) = &args.order {
        query = query.order(column, !args.desc);
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }
    if args.single {
        query = query.single();
    }

    let data = query
        .await
        .map_err(|e| anyhow::anyhow!("Query failed [{}]: {}", e.code(), e))?;
    write_json(out, &to_json(data))
}

pub async fn insert(
    db: &MockDatabase,
    table: &str,
    payload: &str,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let payload: Value =
        serde_json::from_str(payload).map_err(|e| anyhow::anyhow!("Invalid JSON payload: {e}"))?;
    let data = db
        .from(table)
        .insert(payload)
        .await
        .map_err(|e| anyhow::anyhow!("Insert failed [{}]: {}", e.code(), e))?;
    write_json(out, &to_json(data))
}

/// Forget the persisted rows of `table`; the next read re-seeds it.
pub async fn reset(tables: &TableStore, table: &str, out: &mut impl Write) -> anyhow::Result<()> {
    if tables.reset(table).await? {
        writeln!(out, "Reset {table}")?;
    } else {
        writeln!(out, "{table} has no stored rows")?;
    }
    Ok(())
}

fn to_json(data: QueryData) -> Value {
    match data {
        QueryData::Rows(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
        QueryData::Row(row) => Value::Object(row),
        QueryData::Empty => Value::Null,
    }
}

fn write_json(out: &mut impl Write, value: &Value) -> anyhow::Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}
