//! Meaning: one dictionary sense attached to a vocab.

use crate::view::spec::{EntityFetchSpec, RelationSpec, TableMeta};

pub const ENTITY: &str = "meaning";

pub fn spec() -> EntityFetchSpec {
    EntityFetchSpec::new(
        ENTITY,
        TableMeta::new("public", "meanings", "id").cast("created_at", "timestamptz"),
    )
    .column("id")
    .column("vocab_id")
    .column("dictionary_id")
    .column("value")
    .column("created_at")
    .relation(
        "dictionary",
        RelationSpec::to_one(super::dictionary::ENTITY, "dictionary_id", "id"),
    )
}
