//! Builds parameterized SELECTs from entity fetch specs: field-projected
//! primary fetches, batched child fetches, and JSON-shaped filter rendering.

use crate::error::AppError;
use crate::view::spec::{EntityFetchSpec, FieldFetchSpec};
use serde_json::Value;

/// Alias of the primary table in every statement; formula expressions are
/// written against it.
pub const MAIN_ALIAS: &str = "t";

/// Quote identifier for PostgreSQL (safe: only from entity specs).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// SELECT list for the requested fields: pk first, then columns as
/// `t."name"`, formulas as aliased scalar expressions, then any join-key
/// columns the caller needs. Deduplicated, order preserved.
fn select_list(entity: &EntityFetchSpec, fields: &[String], extra_keys: &[String]) -> String {
    fn push(entity: &EntityFetchSpec, name: &str, parts: &mut Vec<String>, seen: &mut Vec<String>) {
        if seen.iter().any(|s| s == name) {
            return;
        }
        let expr = match entity.spec(name) {
            Some(FieldFetchSpec::DbColumn) => format!("{}.{}", MAIN_ALIAS, quoted(name)),
            Some(FieldFetchSpec::Formula { expr }) => format!("({}) AS {}", expr, quoted(name)),
            // Join keys may be physical-only; select them as plain columns.
            None => format!("{}.{}", MAIN_ALIAS, quoted(name)),
            Some(_) => return,
        };
        seen.push(name.to_string());
        parts.push(expr);
    }
    let mut seen = Vec::new();
    let mut parts = Vec::new();
    push(entity, &entity.table.pk, &mut parts, &mut seen);
    for f in fields {
        push(entity, f, &mut parts, &mut seen);
    }
    for k in extra_keys {
        push(entity, k, &mut parts, &mut seen);
    }
    parts.join(", ")
}

/// Primary fetch: `SELECT ... FROM entity t [WHERE ...] ORDER BY pk`.
pub fn select_entity(
    entity: &EntityFetchSpec,
    filter: Option<&Value>,
    fields: &[String],
    extra_keys: &[String],
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.table.schema, &entity.table.table);
    let cols = select_list(entity, fields, extra_keys);
    let where_clause = match filter {
        Some(f) => {
            let cond = filter_condition(entity, f, &mut q)?;
            if cond == "TRUE" {
                String::new()
            } else {
                format!(" WHERE {}", cond)
            }
        }
        None => String::new(),
    };
    q.sql = format!(
        "SELECT {} FROM {} {}{} ORDER BY {}.{}",
        cols,
        table,
        MAIN_ALIAS,
        where_clause,
        MAIN_ALIAS,
        quoted(&entity.table.pk)
    );
    Ok(q)
}

/// Batched child fetch for relation population:
/// `SELECT ... WHERE t.key IN ($1, ...) [AND (filter)] ORDER BY pk`.
/// One query per populate path, never per parent record.
pub fn select_children(
    entity: &EntityFetchSpec,
    key_column: &str,
    key_values: &[Value],
    filter: Option<&Value>,
    fields: &[String],
    extra_keys: &[String],
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.table.schema, &entity.table.table);
    // The key column must always come back so children group onto parents.
    let mut keys: Vec<String> = vec![key_column.to_string()];
    keys.extend(extra_keys.iter().cloned());
    let cols = select_list(entity, fields, &keys);
    let placeholders: Vec<String> = key_values
        .iter()
        .map(|v| {
            let n = q.push_param(v.clone());
            cast_placeholder(entity, key_column, n)
        })
        .collect();
    let mut where_clause = format!(
        "{}.{} IN ({})",
        MAIN_ALIAS,
        quoted(key_column),
        placeholders.join(", ")
    );
    if let Some(f) = filter {
        let cond = filter_condition(entity, f, &mut q)?;
        if cond != "TRUE" {
            where_clause.push_str(&format!(" AND ({})", cond));
        }
    }
    q.sql = format!(
        "SELECT {} FROM {} {} WHERE {} ORDER BY {}.{}",
        cols,
        table,
        MAIN_ALIAS,
        where_clause,
        MAIN_ALIAS,
        quoted(&entity.table.pk)
    );
    Ok(q)
}

fn cast_placeholder(entity: &EntityFetchSpec, column: &str, n: usize) -> String {
    match entity.table.casts.get(column) {
        Some(t) => format!("${}::{}", n, t),
        None => format!("${}", n),
    }
}

/// Render a JSON-shaped filter as a parameterized condition. Supported
/// shapes: `{col: value}` equality (null → IS NULL), `{col: {"$in": [...]}}`,
/// `{"$and": [...]}`, `{"$or": [...]}`. Multiple keys in one object AND
/// together. Unknown columns are an error, never silently dropped — a
/// dropped constraint would widen a security filter.
fn filter_condition(
    entity: &EntityFetchSpec,
    filter: &Value,
    q: &mut QueryBuf,
) -> Result<String, AppError> {
    let obj = filter
        .as_object()
        .ok_or_else(|| AppError::BadRequest(format!("filter must be an object, got: {filter}")))?;
    if obj.is_empty() {
        return Ok("TRUE".to_string());
    }
    let mut parts = Vec::new();
    for (key, val) in obj {
        match key.as_str() {
            "$and" | "$or" => {
                let arms = val.as_array().ok_or_else(|| {
                    AppError::BadRequest(format!("{key} expects an array, got: {val}"))
                })?;
                let joiner = if key == "$and" { " AND " } else { " OR " };
                let rendered: Result<Vec<String>, AppError> = arms
                    .iter()
                    .map(|arm| filter_condition(entity, arm, q))
                    .collect();
                parts.push(format!("({})", rendered?.join(joiner)));
            }
            col => {
                if !entity.column_names().any(|c| c == col) {
                    return Err(AppError::BadRequest(format!(
                        "unknown filter column '{}' on '{}'",
                        col, entity.entity_type
                    )));
                }
                parts.push(column_condition(entity, col, val, q)?);
            }
        }
    }
    Ok(parts.join(" AND "))
}

fn column_condition(
    entity: &EntityFetchSpec,
    col: &str,
    val: &Value,
    q: &mut QueryBuf,
) -> Result<String, AppError> {
    if val.is_null() {
        return Ok(format!("{}.{} IS NULL", MAIN_ALIAS, quoted(col)));
    }
    if let Some(inner) = val.as_object() {
        let values = inner.get("$in").and_then(Value::as_array).ok_or_else(|| {
            AppError::BadRequest(format!("unsupported filter operator for '{col}': {val}"))
        })?;
        let placeholders: Vec<String> = values
            .iter()
            .map(|v| {
                let n = q.push_param(v.clone());
                cast_placeholder(entity, col, n)
            })
            .collect();
        return Ok(format!(
            "{}.{} IN ({})",
            MAIN_ALIAS,
            quoted(col),
            placeholders.join(", ")
        ));
    }
    let n = q.push_param(val.clone());
    Ok(format!(
        "{}.{} = {}",
        MAIN_ALIAS,
        quoted(col),
        cast_placeholder(entity, col, n)
    ))
}
