//! PostgreSQL repository: field-projected primary fetches and batched
//! relation population over sqlx.

use crate::error::AppError;
use crate::record::{Populated, Record};
use crate::repo::Repository;
use crate::sql::{self, PgBindValue, QueryBuf};
use crate::view::path::resolve_at_path;
use crate::view::spec::{Cardinality, EntityFetchSpec, FetchSpecRegistry, FieldFetchSpec, RelationSpec};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;

pub struct PgRepository {
    pool: PgPool,
    registry: Arc<FetchSpecRegistry>,
}

impl PgRepository {
    pub fn new(pool: PgPool, registry: Arc<FetchSpecRegistry>) -> Self {
        PgRepository { pool, registry }
    }

    async fn fetch(&self, q: &QueryBuf) -> Result<Vec<sqlx::postgres::PgRow>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn populate_paths(
        &self,
        entity_type: &str,
        records: &[Record],
        paths: &[String],
        first_filter: Option<&Value>,
        fields: &[String],
    ) -> Result<(), AppError> {
        for (i, path) in paths.iter().enumerate() {
            let filter = if i == 0 { first_filter } else { None };
            self.populate_one(entity_type, records, path, filter, paths, fields)
                .await?;
        }
        Ok(())
    }

    /// Populate one relation path: walk to the parent set in memory, batch
    /// fetch the related rows with a single IN-query, attach. Children are
    /// deduplicated by pk within the call, so a row shared by several parents
    /// materializes as one record instance.
    async fn populate_one(
        &self,
        entity_type: &str,
        roots: &[Record],
        path: &str,
        filter: Option<&Value>,
        all_paths: &[String],
        fields: &[String],
    ) -> Result<(), AppError> {
        let root_entity = self.registry.entity(entity_type)?;
        let (prefix, segment) = split_last(path);
        let parents = resolve_at_path(root_entity, &self.registry, prefix, roots)?;
        let parent_entity = self.registry.entity_at_path(root_entity, prefix)?;
        let rel = relation_segment(parent_entity, segment)?;
        let target = self.registry.entity(&rel.target)?;

        let mut key_values: Vec<Value> = Vec::new();
        for p in &parents {
            if let Some(v) = p.get(&rel.our_key) {
                if !v.is_null() && !key_values.contains(&v) {
                    key_values.push(v);
                }
            }
        }
        if key_values.is_empty() {
            if rel.cardinality == Cardinality::ToMany {
                for p in &parents {
                    p.set_relation(segment, Populated::Many(Vec::new()));
                }
            }
            return Ok(());
        }

        let child_fields = fields_under(fields, path);
        let extra_keys = deeper_key_columns(target, all_paths, path);
        let q = sql::select_children(
            target,
            &rel.their_key,
            &key_values,
            filter,
            &child_fields,
            &extra_keys,
        )?;
        let rows = self.fetch(&q).await?;

        let mut by_pk: HashMap<String, Record> = HashMap::new();
        let mut by_parent_key: HashMap<String, Vec<Record>> = HashMap::new();
        for row in &rows {
            let values = row_to_values(row);
            let pk = values.get(target.table.pk.as_str()).cloned().unwrap_or(Value::Null);
            let record = by_pk
                .entry(pk.to_string())
                .or_insert_with(|| Record::from_values(values.clone()))
                .clone();
            if let Some(k) = values.get(rel.their_key.as_str()) {
                by_parent_key.entry(k.to_string()).or_default().push(record);
            }
        }

        for p in &parents {
            let Some(k) = p.get(&rel.our_key) else { continue };
            let children = by_parent_key.get(&k.to_string());
            match rel.cardinality {
                Cardinality::ToMany => {
                    p.set_relation(
                        segment,
                        Populated::Many(children.cloned().unwrap_or_default()),
                    );
                }
                Cardinality::ToOne => {
                    if let Some(first) = children.and_then(|c| c.first()) {
                        p.set_relation(segment, Populated::One(first.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn find(
        &self,
        entity_type: &str,
        where_: &Value,
        fields: &[String],
        populate: &[String],
    ) -> Result<Vec<Record>, AppError> {
        let entity = self.registry.entity(entity_type)?;
        let root_fields: Vec<String> = fields
            .iter()
            .filter(|f| !f.contains('.'))
            .cloned()
            .collect();
        let extra_keys = deeper_key_columns(entity, populate, "");
        let q = sql::select_entity(entity, Some(where_), &root_fields, &extra_keys)?;
        let rows = self.fetch(&q).await?;
        let records: Vec<Record> = rows
            .iter()
            .map(|r| Record::from_values(row_to_values(r)))
            .collect();
        self.populate_paths(entity_type, &records, populate, None, fields)
            .await?;
        Ok(records)
    }

    async fn populate(
        &self,
        entity_type: &str,
        records: &[Record],
        paths: &[String],
        where_: Option<&Value>,
        fields: &[String],
    ) -> Result<(), AppError> {
        self.populate_paths(entity_type, records, paths, where_, fields)
            .await
    }
}

/// Split "a.b.c" into ("a.b", "c"); a bare segment has an empty prefix.
fn split_last(path: &str) -> (&str, &str) {
    match path.rfind('.') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

fn relation_segment<'a>(
    entity: &'a EntityFetchSpec,
    segment: &str,
) -> Result<&'a RelationSpec, AppError> {
    match entity.segment_spec(segment) {
        Some(FieldFetchSpec::Relation(rel)) => Ok(rel),
        _ => Err(crate::error::ViewError::InvalidPath {
            path: segment.to_string(),
            reason: "field fetch spec not found",
            at: segment.to_string(),
        }
        .into()),
    }
}

/// Field names directly under `path` ("a.b" + fields ["a.b.x", "a.b.c.y"] →
/// ["x"]); deeper entries belong to their own populate path.
fn fields_under(fields: &[String], path: &str) -> Vec<String> {
    let prefix = format!("{path}.");
    fields
        .iter()
        .filter_map(|f| f.strip_prefix(&prefix))
        .filter(|rest| !rest.contains('.'))
        .map(str::to_string)
        .collect()
}

/// Join-key columns `entity` must carry so the populate paths one level below
/// `at` can batch on them.
fn deeper_key_columns(entity: &EntityFetchSpec, paths: &[String], at: &str) -> Vec<String> {
    let mut keys = Vec::new();
    for path in paths {
        let rest = if at.is_empty() {
            path.as_str()
        } else {
            match path.strip_prefix(&format!("{at}.")) {
                Some(r) => r,
                None => continue,
            }
        };
        let first = rest.split('.').next().unwrap_or(rest);
        if let Some(FieldFetchSpec::Relation(rel)) = entity.segment_spec(first) {
            if !keys.contains(&rel.our_key) {
                keys.push(rel.our_key.clone());
            }
        }
    }
    keys
}

fn row_to_values(row: &sqlx::postgres::PgRow) -> Map<String, Value> {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_last_handles_bare_and_nested() {
        assert_eq!(split_last("texts"), ("", "texts"));
        assert_eq!(split_last("collection.texts"), ("collection", "texts"));
        assert_eq!(split_last("a.b.c"), ("a.b", "c"));
    }

    #[test]
    fn fields_under_keeps_direct_children_only() {
        let fields = vec![
            "texts.id".to_string(),
            "texts.title".to_string(),
            "texts.vocabs.term".to_string(),
            "id".to_string(),
        ];
        assert_eq!(fields_under(&fields, "texts"), vec!["id", "title"]);
    }

    #[test]
    fn deeper_key_columns_picks_first_segment_relations() {
        let registry = crate::view::test_support::spec_pair();
        let text = registry.entity("text").unwrap();
        let paths = vec!["collection".to_string(), "collection.texts".to_string()];
        assert_eq!(deeper_key_columns(text, &paths, ""), vec!["collection_id"]);
        let collection = registry.entity("collection").unwrap();
        assert_eq!(
            deeper_key_columns(collection, &paths, "collection"),
            vec!["id"]
        );
    }
}
