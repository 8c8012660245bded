//! Entity catalog: the fetch specs and annotators of the content platform.
//! Authored once at startup; the registry is the table the orchestrator and
//! repository read.

pub mod collection;
pub mod dictionary;
pub mod meaning;
pub mod text;
pub mod vocab;

use crate::error::SpecError;
use crate::view::spec::FetchSpecRegistry;
use sqlx::PgPool;

/// Declare every entity spec, then wire the cross-references. Annotators
/// capture the pool here; the fetch context carries only the viewer.
pub fn build_registry(pool: &PgPool) -> Result<FetchSpecRegistry, SpecError> {
    FetchSpecRegistry::builder()
        .register(text::spec(pool))
        .register(collection::spec())
        .register(vocab::spec(pool))
        .register(meaning::spec())
        .register(dictionary::spec())
        .build()
}
