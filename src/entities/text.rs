//! Text: a reading passage in some language, owned by an author, optionally
//! grouped into a collection.

use crate::context::FetchContext;
use crate::error::AppError;
use crate::record::Record;
use crate::view::annotate::Annotator;
use crate::view::spec::{EntityFetchSpec, RelationSpec, TableMeta};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const ENTITY: &str = "text";

pub fn spec(pool: &PgPool) -> EntityFetchSpec {
    EntityFetchSpec::new(
        ENTITY,
        TableMeta::new("public", "texts", "id").cast("created_at", "timestamptz"),
    )
    .column("id")
    .column("title")
    .column("content")
    .column("language_code")
    .column("author_id")
    .column("collection_id")
    .column("is_public")
    .column("created_at")
    .formula(
        "vocab_count",
        "SELECT COUNT(*) FROM public.vocabs v WHERE v.text_id = t.\"id\"",
    )
    .relation(
        "collection",
        RelationSpec::to_one(super::collection::ENTITY, "collection_id", "id"),
    )
    .relation("vocabs", RelationSpec::to_many(super::vocab::ENTITY, "id", "text_id"))
    .annotated("is_bookmarked", Arc::new(IsBookmarked { pool: pool.clone() }))
    .annotated("vocabs_by_level", Arc::new(VocabsByLevel { pool: pool.clone() }))
}

/// Per-viewer bookmark flag. Anonymous viewers get `false` everywhere without
/// touching the database; otherwise one batched query for the whole slice.
pub struct IsBookmarked {
    pool: PgPool,
}

#[async_trait]
impl Annotator for IsBookmarked {
    fn name(&self) -> &'static str {
        "is_bookmarked"
    }

    async fn annotate(&self, records: &[Record], ctx: &FetchContext) -> Result<(), AppError> {
        if records.is_empty() {
            return Ok(());
        }
        let Some(user_id) = ctx.user_id() else {
            for r in records {
                r.set("is_bookmarked", Value::Bool(false));
            }
            return Ok(());
        };
        let ids = text_ids(records);
        let rows: Vec<i64> = sqlx::query_scalar(
            "SELECT text_id FROM public.bookmarks WHERE user_id = $1 AND text_id = ANY($2)",
        )
        .bind(user_id)
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let bookmarked: HashSet<i64> = rows.into_iter().collect();
        for r in records {
            let flag = r
                .get("id")
                .and_then(|v| v.as_i64())
                .map(|id| bookmarked.contains(&id))
                .unwrap_or(false);
            r.set("is_bookmarked", Value::Bool(flag));
        }
        Ok(())
    }
}

/// Histogram of the viewer's vocabulary levels per text, e.g.
/// `{"0": 41, "3": 7}`. Untracked terms count as level 0, which is also what
/// an anonymous viewer sees for everything.
pub struct VocabsByLevel {
    pool: PgPool,
}

#[async_trait]
impl Annotator for VocabsByLevel {
    fn name(&self) -> &'static str {
        "vocabs_by_level"
    }

    async fn annotate(&self, records: &[Record], ctx: &FetchContext) -> Result<(), AppError> {
        if records.is_empty() {
            return Ok(());
        }
        let ids = text_ids(records);
        // A NULL user id matches no progress rows, so every term lands on
        // level 0 for anonymous viewers with the same single query.
        let rows: Vec<(i64, i32, i64)> = sqlx::query_as(
            "SELECT v.text_id, COALESCE(p.level, 0) AS level, COUNT(*) \
             FROM public.vocabs v \
             LEFT JOIN public.vocab_progress p ON p.vocab_id = v.id AND p.user_id = $1 \
             WHERE v.text_id = ANY($2) \
             GROUP BY v.text_id, COALESCE(p.level, 0)",
        )
        .bind(ctx.user_id())
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_text: HashMap<i64, Map<String, Value>> = HashMap::new();
        for (text_id, level, count) in rows {
            by_text
                .entry(text_id)
                .or_default()
                .insert(level.to_string(), Value::Number(count.into()));
        }
        for r in records {
            let histogram = r
                .get("id")
                .and_then(|v| v.as_i64())
                .and_then(|id| by_text.remove(&id))
                .unwrap_or_default();
            r.set("vocabs_by_level", Value::Object(histogram));
        }
        Ok(())
    }
}

fn text_ids(records: &[Record]) -> Vec<i64> {
    let mut ids = Vec::with_capacity(records.len());
    for r in records {
        if let Some(id) = r.get("id").and_then(|v| v.as_i64()) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}
