//! Post-fetch annotation: async steps that attach derived, non-persisted
//! fields to already-fetched records.

use crate::context::FetchContext;
use crate::error::AppError;
use crate::record::Record;
use async_trait::async_trait;

/// An annotation step supplied by entity-specific code.
///
/// Contract: mutate every record in `records` in place, tolerate an empty
/// slice, and issue at most one batched parameterized query regardless of
/// slice size. The same record instance may be handed to an annotator twice
/// when two declared paths resolve to overlapping records, so implementations
/// must be idempotent (last write wins).
#[async_trait]
pub trait Annotator: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn annotate(&self, records: &[Record], ctx: &FetchContext) -> Result<(), AppError>;
}
