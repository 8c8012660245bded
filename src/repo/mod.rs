//! Persistence surface the view core depends on. Any storage engine exposing
//! this shape is compatible (the integration tests run an in-memory one).

mod postgres;
pub use postgres::PgRepository;

use crate::error::AppError;
use crate::record::Record;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Repository: Send + Sync {
    /// Primary fetch: records of `entity_type` matching `where_`, with the
    /// given fields selected and the given relation paths eagerly populated.
    /// Field and populate paths are dotted and absolute; populate paths
    /// arrive parent before child.
    async fn find(
        &self,
        entity_type: &str,
        where_: &Value,
        fields: &[String],
        populate: &[String],
    ) -> Result<Vec<Record>, AppError>;

    /// Scoped population pass: augment the already-fetched `records` in place
    /// along `paths`. `where_` constrains the relation at `paths[0]` only;
    /// the remaining paths are unconditional sub-populates beneath it. Never
    /// re-filters or re-fetches the roots.
    async fn populate(
        &self,
        entity_type: &str,
        records: &[Record],
        paths: &[String],
        where_: Option<&Value>,
        fields: &[String],
    ) -> Result<(), AppError>;
}
