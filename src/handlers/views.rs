//! Read endpoints: each declares a static view description per response
//! shape and resolves it through the view executor.

use crate::case::{to_snake_case, value_keys_to_camel_case_recursive};
use crate::context::FetchContext;
use crate::entities::{collection, text, vocab};
use crate::error::AppError;
use crate::extractors::Viewer;
use crate::record::Record;
use crate::response::{success_many, success_one};
use crate::state::AppState;
use crate::view::{execute_view, RelationFilters, ViewDescription};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

fn text_list_view() -> ViewDescription {
    ViewDescription::fields([
        "id",
        "title",
        "language_code",
        "author_id",
        "is_public",
        "vocab_count",
        "is_bookmarked",
    ])
    .relation("collection", ["id", "title"])
}

fn text_detail_view() -> ViewDescription {
    ViewDescription::fields([
        "id",
        "title",
        "content",
        "language_code",
        "author_id",
        "is_public",
        "created_at",
        "vocab_count",
        "is_bookmarked",
        "vocabs_by_level",
    ])
    .relation("collection", ["id", "title"])
    .relation(
        "vocabs",
        ViewDescription::fields(["id", "term", "language_code", "level"]).relation(
            "meanings",
            ViewDescription::fields(["id", "value"]).relation("dictionary", ["id", "name"]),
        ),
    )
}

fn collection_list_view() -> ViewDescription {
    ViewDescription::fields(["id", "title", "author_id", "is_public", "text_count"])
}

fn collection_detail_view() -> ViewDescription {
    ViewDescription::fields(["id", "title", "author_id", "is_public", "created_at", "text_count"])
        .relation(
            "texts",
            ViewDescription::fields(["id", "title", "language_code", "is_public", "is_bookmarked"]),
        )
}

fn vocab_detail_view() -> ViewDescription {
    ViewDescription::fields(["id", "term", "language_code", "level"]).relation(
        "meanings",
        ViewDescription::fields(["id", "value"]).relation(
            "dictionary",
            ["id", "name", "lookup_uri"],
        ),
    )
}

const DEFAULT_LIMIT: usize = 100;

struct ListParams {
    where_: Value,
    limit: usize,
    offset: usize,
}

/// limit/offset plus exact-match column filters. camelCase keys accepted;
/// params that are not declared columns never become constraints.
fn parse_list_params(state: &AppState, entity_type: &str, params: HashMap<String, String>) -> Result<ListParams, AppError> {
    let entity = state.registry.entity(entity_type)?;
    let mut filters = Map::new();
    let mut limit = DEFAULT_LIMIT;
    let mut offset = 0usize;
    for (k, v) in params {
        match k.as_str() {
            "limit" => {
                if let Ok(n) = v.parse::<usize>() {
                    limit = n.min(1000);
                }
            }
            "offset" => {
                if let Ok(n) = v.parse::<usize>() {
                    offset = n;
                }
            }
            _ => {
                let col = to_snake_case(&k);
                if entity.column_names().any(|c| c == col) {
                    filters.insert(col, coerce_query_value(&v));
                }
            }
        }
    }
    Ok(ListParams {
        where_: Value::Object(filters),
        limit,
        offset,
    })
}

/// Query params arrive as strings; coerce the obvious scalars so equality
/// filters bind with the right types.
fn coerce_query_value(s: &str) -> Value {
    if s.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(n) = s.parse::<i64>() {
        return Value::Number(n.into());
    }
    Value::String(s.to_string())
}

fn parse_id(id_str: &str) -> Result<i64, AppError> {
    id_str
        .parse()
        .map_err(|_| AppError::BadRequest("invalid id".into()))
}

fn to_api_value(record: &Record) -> Value {
    let mut v = record.to_value();
    value_keys_to_camel_case_recursive(&mut v);
    v
}

// TODO: push limit/offset into Repository::find instead of slicing the
// resolved set post-fetch.
fn page(records: Vec<Record>, limit: usize, offset: usize) -> Vec<Value> {
    records
        .iter()
        .skip(offset)
        .take(limit)
        .map(to_api_value)
        .collect()
}

pub async fn list_texts(
    State(state): State<AppState>,
    Viewer(user): Viewer,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let ctx = FetchContext { user };
    let p = parse_list_params(&state, text::ENTITY, params)?;
    let records = execute_view(
        state.repo.as_ref(),
        text::ENTITY,
        &p.where_,
        &RelationFilters::new(),
        &text_list_view(),
        &state.registry,
        &ctx,
    )
    .await?;
    Ok(Json(success_many(page(records, p.limit, p.offset))))
}

pub async fn read_text(
    State(state): State<AppState>,
    Viewer(user): Viewer,
    Path(id_str): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let ctx = FetchContext { user };
    let id = parse_id(&id_str)?;
    let records = execute_view(
        state.repo.as_ref(),
        text::ENTITY,
        &json!({"id": id}),
        &RelationFilters::new(),
        &text_detail_view(),
        &state.registry,
        &ctx,
    )
    .await?;
    let record = records.first().ok_or_else(|| AppError::NotFound(id_str))?;
    Ok(Json(success_one(to_api_value(record))))
}

pub async fn list_collections(
    State(state): State<AppState>,
    Viewer(user): Viewer,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let ctx = FetchContext { user };
    let p = parse_list_params(&state, collection::ENTITY, params)?;
    let records = execute_view(
        state.repo.as_ref(),
        collection::ENTITY,
        &p.where_,
        &RelationFilters::new(),
        &collection_list_view(),
        &state.registry,
        &ctx,
    )
    .await?;
    Ok(Json(success_many(page(records, p.limit, p.offset))))
}

pub async fn read_collection(
    State(state): State<AppState>,
    Viewer(user): Viewer,
    Path(id_str): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let ctx = FetchContext { user };
    let id = parse_id(&id_str)?;
    // ?authorId=7 narrows the populated texts beyond the visibility rule.
    let mut relation_filters = RelationFilters::new();
    if let Some(author) = params
        .get("authorId")
        .or_else(|| params.get("author_id"))
        .and_then(|s| s.parse::<i64>().ok())
    {
        relation_filters.insert("texts".to_string(), json!({"author_id": author}));
    }
    let records = execute_view(
        state.repo.as_ref(),
        collection::ENTITY,
        &json!({"id": id}),
        &relation_filters,
        &collection_detail_view(),
        &state.registry,
        &ctx,
    )
    .await?;
    let record = records.first().ok_or_else(|| AppError::NotFound(id_str))?;
    Ok(Json(success_one(to_api_value(record))))
}

pub async fn read_vocab(
    State(state): State<AppState>,
    Viewer(user): Viewer,
    Path(id_str): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let ctx = FetchContext { user };
    let id = parse_id(&id_str)?;
    let records = execute_view(
        state.repo.as_ref(),
        vocab::ENTITY,
        &json!({"id": id}),
        &RelationFilters::new(),
        &vocab_detail_view(),
        &state.registry,
        &ctx,
    )
    .await?;
    let record = records.first().ok_or_else(|| AppError::NotFound(id_str))?;
    Ok(Json(success_one(to_api_value(record))))
}
