//! Dictionary: an external lookup source meanings are drawn from.

use crate::view::spec::{EntityFetchSpec, TableMeta};

pub const ENTITY: &str = "dictionary";

pub fn spec() -> EntityFetchSpec {
    EntityFetchSpec::new(ENTITY, TableMeta::new("public", "dictionaries", "id"))
        .column("id")
        .column("name")
        .column("lookup_uri")
        .column("language_code")
}
