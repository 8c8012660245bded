//! Content read routes. Each endpoint resolves a statically declared view.

use crate::handlers::views::{list_collections, list_texts, read_collection, read_text, read_vocab};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn content_routes(state: AppState) -> Router {
    Router::new()
        .route("/texts", get(list_texts))
        .route("/texts/:id", get(read_text))
        .route("/collections", get(list_collections))
        .route("/collections/:id", get(read_collection))
        .route("/vocabs/:id", get(read_vocab))
        .with_state(state)
}
