//! End-to-end view execution: compile the plan, run the primary fetch, run
//! scoped population for filtered relations, then the annotation steps.

use crate::context::FetchContext;
use crate::error::AppError;
use crate::record::Record;
use crate::repo::Repository;
use crate::view::description::ViewDescription;
use crate::view::filter::RelationFilters;
use crate::view::path::resolve_at_path;
use crate::view::plan::compile;
use crate::view::spec::FetchSpecRegistry;
use serde_json::Value;

/// Fetch `entity_type` records matching `where_`, shaped by `view`.
///
/// Ordering: the primary fetch completes before any filtered population; all
/// population completes before the first annotator; annotators run strictly
/// sequentially in plan (declaration) order, since later ones may read state
/// written by earlier ones and each issues its own batched query.
///
/// Spec/view errors and repository errors propagate unchanged; there are no
/// retries and no partial results.
pub async fn execute_view(
    repo: &dyn Repository,
    entity_type: &str,
    where_: &Value,
    relation_filters: &RelationFilters,
    view: &ViewDescription,
    registry: &FetchSpecRegistry,
    ctx: &FetchContext,
) -> Result<Vec<Record>, AppError> {
    let entity = registry.entity(entity_type)?;
    let plan = compile(view, entity, registry, ctx, relation_filters)?;

    let records = repo
        .find(entity_type, where_, &plan.local_fields, &plan.local_populate)
        .await?;

    for group in &plan.filtered_populates {
        repo.populate(
            entity_type,
            &records,
            &group.populate,
            Some(&group.filter),
            &group.fields,
        )
        .await?;
    }

    for step in &plan.annotated_fields {
        let targets = resolve_at_path(entity, registry, &step.path, &records)?;
        tracing::debug!(
            annotator = step.annotate.name(),
            path = %step.path,
            targets = targets.len(),
            "annotate"
        );
        step.annotate.annotate(&targets, ctx).await?;
    }

    Ok(records)
}
