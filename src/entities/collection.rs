//! Collection: an author-curated group of texts.

use crate::view::spec::{EntityFetchSpec, RelationSpec, TableMeta};
use serde_json::json;

pub const ENTITY: &str = "collection";

pub fn spec() -> EntityFetchSpec {
    EntityFetchSpec::new(
        ENTITY,
        TableMeta::new("public", "collections", "id").cast("created_at", "timestamptz"),
    )
    .column("id")
    .column("title")
    .column("author_id")
    .column("is_public")
    .column("created_at")
    .formula(
        "text_count",
        "SELECT COUNT(*) FROM public.texts x WHERE x.collection_id = t.\"id\"",
    )
    .relation(
        "texts",
        RelationSpec::to_many(super::text::ENTITY, "id", "collection_id").with_context_filter(
            // Visibility rule: anonymous viewers see public texts only;
            // authenticated viewers additionally see their own.
            |ctx| {
                Some(match ctx.user_id() {
                    None => json!({"is_public": true}),
                    Some(uid) => json!({"$or": [{"is_public": true}, {"author_id": uid}]}),
                })
            },
        ),
    )
}
