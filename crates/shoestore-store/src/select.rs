//! Select specification parsing.
//!
//! Grammar (a subset of PostgREST resource embedding):
//!
//! ```text
//! spec   := item ("," item)*
//! item   := "*" | [alias ":"] column | embed
//! embed  := [alias ":"] table ["!" fk_column] "(" spec ")"
//! ```

use crate::error::StoreError;

/// Which plain columns a select keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Columns {
    All,
    /// `(output name, source column)` pairs.
    Named(Vec<(String, String)>),
}

/// Parsed select specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectSpec {
    pub columns: Columns,
    pub embeds: Vec<Embed>,
}

/// A join directive: attach rows of `table` under `alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub alias: String,
    /// Whether the alias was written explicitly (`alias:table(...)`).
    pub explicit_alias: bool,
    pub table: String,
    pub fk_hint: Option<String>,
    pub spec: SelectSpec,
}

impl SelectSpec {
    /// `*` with no embeds.
    pub const fn all() -> Self {
        Self {
            columns: Columns::All,
            embeds: Vec::new(),
        }
    }

    /// Parse a select string. An empty string selects every column.
    pub fn parse(input: &str) -> Result<Self, StoreError> {
        let mut star = false;
        let mut named = Vec::new();
        let mut embeds = Vec::new();

        for item in split_top_level(input)? {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            if item == "*" {
                star = true;
            } else if let Some(open) = item.find('(') {
                embeds.push(parse_embed(item, open)?);
            } else {
                named.push(parse_column(item)?);
            }
        }

        // A spec listing only embeds keeps the parent's columns, like `*`.
        let columns = if star || named.is_empty() {
            Columns::All
        } else {
            Columns::Named(named)
        };
        Ok(Self { columns, embeds })
    }

    pub fn has_embeds(&self) -> bool {
        !self.embeds.is_empty()
    }
}

fn split_top_level(input: &str) -> Result<Vec<&str>, StoreError> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in input.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| StoreError::InvalidSelect(format!("unbalanced ')' in {input:?}")))?;
            }
            ',' if depth == 0 => {
                items.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(StoreError::InvalidSelect(format!(
            "unbalanced '(' in {input:?}"
        )));
    }
    items.push(&input[start..]);
    Ok(items)
}

fn parse_column(item: &str) -> Result<(String, String), StoreError> {
    let (alias, column) = match item.split_once(':') {
        Some((alias, column)) => (alias.trim(), column.trim()),
        None => (item, item),
    };
    if !is_identifier(alias) || !is_identifier(column) {
        return Err(StoreError::InvalidSelect(format!("bad column {item:?}")));
    }
    Ok((alias.to_string(), column.to_string()))
}

fn parse_embed(item: &str, open: usize) -> Result<Embed, StoreError> {
    let inner = item[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| StoreError::InvalidSelect(format!("trailing text after {item:?}")))?;
    let head = item[..open].trim();

    let (alias, target) = match head.split_once(':') {
        Some((alias, target)) => (Some(alias.trim()), target.trim()),
        None => (None, head),
    };
    let (table, fk_hint) = match target.split_once('!') {
        Some((table, fk)) => (table.trim(), Some(fk.trim().to_string())),
        None => (target, None),
    };

    let names_ok = is_identifier(table)
        && alias.is_none_or(is_identifier)
        && fk_hint.as_deref().is_none_or(is_identifier);
    if !names_ok {
        return Err(StoreError::InvalidSelect(format!("bad embed {head:?}")));
    }

    Ok(Embed {
        alias: alias.unwrap_or(table).to_string(),
        explicit_alias: alias.is_some(),
        table: table.to_string(),
        fk_hint,
        spec: SelectSpec::parse(inner)?,
    })
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
