//! Vocab: a term extracted from a text, with per-viewer learning progress.

use crate::context::FetchContext;
use crate::error::AppError;
use crate::record::Record;
use crate::view::annotate::Annotator;
use crate::view::spec::{EntityFetchSpec, RelationSpec, TableMeta};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;

pub const ENTITY: &str = "vocab";

pub fn spec(pool: &PgPool) -> EntityFetchSpec {
    EntityFetchSpec::new(ENTITY, TableMeta::new("public", "vocabs", "id"))
        .column("id")
        .column("term")
        .column("language_code")
        .column("text_id")
        .relation("text", RelationSpec::to_one(super::text::ENTITY, "text_id", "id"))
        .relation(
            "meanings",
            RelationSpec::to_many(super::meaning::ENTITY, "id", "vocab_id"),
        )
        .annotated("level", Arc::new(ProgressLevel { pool: pool.clone() }))
}

/// The viewer's learning level for each term (0 = untracked). Anonymous
/// viewers are all level 0, no query.
pub struct ProgressLevel {
    pool: PgPool,
}

#[async_trait]
impl Annotator for ProgressLevel {
    fn name(&self) -> &'static str {
        "level"
    }

    async fn annotate(&self, records: &[Record], ctx: &FetchContext) -> Result<(), AppError> {
        if records.is_empty() {
            return Ok(());
        }
        let Some(user_id) = ctx.user_id() else {
            for r in records {
                r.set("level", Value::Number(0.into()));
            }
            return Ok(());
        };
        let mut ids: Vec<i64> = Vec::with_capacity(records.len());
        for r in records {
            if let Some(id) = r.get("id").and_then(|v| v.as_i64()) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        let rows: Vec<(i64, i32)> = sqlx::query_as(
            "SELECT vocab_id, level FROM public.vocab_progress WHERE user_id = $1 AND vocab_id = ANY($2)",
        )
        .bind(user_id)
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let levels: HashMap<i64, i32> = rows.into_iter().collect();
        for r in records {
            let level = r
                .get("id")
                .and_then(|v| v.as_i64())
                .and_then(|id| levels.get(&id).copied())
                .unwrap_or(0);
            r.set("level", Value::Number(level.into()));
        }
        Ok(())
    }
}
