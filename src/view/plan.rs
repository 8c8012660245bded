//! Fetch-plan compilation: walk a view description against an entity's fetch
//! spec and flatten it into execution instructions for the repository.

use crate::context::FetchContext;
use crate::error::ViewError;
use crate::view::annotate::Annotator;
use crate::view::description::ViewDescription;
use crate::view::filter::{self, RelationFilters};
use crate::view::spec::{EntityFetchSpec, FetchSpecRegistry, FieldFetchSpec};
use serde_json::Value;
use std::sync::Arc;

/// A relation (plus everything nested under it) that must be fetched through
/// its own scoped population call. The filter applies to the first populate
/// path only; folding it into the primary fetch would re-filter the roots.
#[derive(Debug)]
pub struct FilteredPopulate {
    pub populate: Vec<String>,
    pub filter: Value,
    pub fields: Vec<String>,
}

/// One annotation step: the path names the record set the annotator mutates
/// (its parent prefix, not a per-field position).
pub struct AnnotationStep {
    pub path: String,
    pub annotate: Arc<dyn Annotator>,
}

impl std::fmt::Debug for AnnotationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationStep")
            .field("path", &self.path)
            .field("annotate", &self.annotate.name())
            .finish()
    }
}

/// Flattened, per-request execution plan. Built and consumed within a single
/// resolution call.
#[derive(Debug, Default)]
pub struct FetchPlan {
    pub local_fields: Vec<String>,
    pub local_populate: Vec<String>,
    pub filtered_populates: Vec<FilteredPopulate>,
    pub annotated_fields: Vec<AnnotationStep>,
}

/// Compile a view description against `entity`'s fetch spec.
///
/// Populate paths come out parent-before-child, and a filtered group precedes
/// the groups propagated from its own subtree; the executor relies on both.
pub fn compile(
    view: &ViewDescription,
    entity: &EntityFetchSpec,
    registry: &FetchSpecRegistry,
    ctx: &FetchContext,
    relation_filters: &RelationFilters,
) -> Result<FetchPlan, ViewError> {
    compile_at(view, entity, registry, ctx, relation_filters, "")
}

fn compile_at(
    view: &ViewDescription,
    entity: &EntityFetchSpec,
    registry: &FetchSpecRegistry,
    ctx: &FetchContext,
    relation_filters: &RelationFilters,
    prefix: &str,
) -> Result<FetchPlan, ViewError> {
    let mut plan = FetchPlan::default();

    for field in &view.fields {
        match entity.spec(field) {
            None => {
                return Err(ViewError::InvalidViewField {
                    field: field.clone(),
                    view: view.summary(),
                })
            }
            Some(FieldFetchSpec::DbColumn) | Some(FieldFetchSpec::Formula { .. }) => {
                plan.local_fields.push(join_path(prefix, field));
            }
            Some(FieldFetchSpec::Annotated(annotate)) => {
                plan.annotated_fields.push(AnnotationStep {
                    path: prefix.to_string(),
                    annotate: annotate.clone(),
                });
            }
            // Relations are requested through `view.relations`, never `fields`.
            Some(FieldFetchSpec::Relation(_)) => {}
        }
    }

    for (key, sub_view) in &view.relations {
        // A stale view entry naming a missing or non-relation field is a
        // no-op, not an error.
        let Some(rel) = entity.relation_spec(key) else {
            continue;
        };
        let Some(target) = registry.get(&rel.target) else {
            continue;
        };
        let abs_path = join_path(prefix, entity.populate_property(key));
        let nested = compile_at(sub_view, target, registry, ctx, relation_filters, &abs_path)?;

        let context_filter = rel.context_filter.as_ref().and_then(|f| f(ctx));
        let external_filter = relation_filters.get(&abs_path).cloned();
        match filter::and(context_filter, external_filter) {
            Some(merged) => {
                let mut populate = Vec::with_capacity(1 + nested.local_populate.len());
                populate.push(abs_path);
                populate.extend(nested.local_populate);
                plan.filtered_populates.push(FilteredPopulate {
                    populate,
                    filter: merged,
                    fields: nested.local_fields,
                });
            }
            None => {
                plan.local_populate.push(abs_path);
                plan.local_fields.extend(nested.local_fields);
                plan.local_populate.extend(nested.local_populate);
            }
        }
        plan.filtered_populates.extend(nested.filtered_populates);
        plan.annotated_fields.extend(nested.annotated_fields);
    }

    Ok(plan)
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::test_support::{spec_pair, spec_pair_with_annotator};
    use serde_json::json;
    use std::collections::HashMap;

    fn anon() -> FetchContext {
        FetchContext::anonymous()
    }

    #[test]
    fn columns_and_formulas_land_in_local_fields_once() {
        let registry = spec_pair();
        let view = ViewDescription::fields(["id", "title", "vocab_count"]);
        let plan = compile(
            &view,
            registry.entity("text").unwrap(),
            &registry,
            &anon(),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(plan.local_fields, vec!["id", "title", "vocab_count"]);
        assert!(plan.local_populate.is_empty());
        assert!(plan.filtered_populates.is_empty());
    }

    #[test]
    fn nested_fields_are_path_qualified() {
        let registry = spec_pair();
        let view = ViewDescription::fields(["id"]).relation("collection", ["id", "title"]);
        let plan = compile(
            &view,
            registry.entity("text").unwrap(),
            &registry,
            &anon(),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(plan.local_fields, vec!["id", "collection.id", "collection.title"]);
        assert_eq!(plan.local_populate, vec!["collection"]);
    }

    #[test]
    fn context_filtered_relation_routes_to_filtered_populates() {
        let registry = spec_pair();
        let view = ViewDescription::fields(["id"]).relation("texts", ["id"]);
        let plan = compile(
            &view,
            registry.entity("collection").unwrap(),
            &registry,
            &anon(),
            &HashMap::new(),
        )
        .unwrap();
        assert!(plan.local_populate.is_empty());
        assert_eq!(plan.filtered_populates.len(), 1);
        let group = &plan.filtered_populates[0];
        assert_eq!(group.populate, vec!["texts"]);
        assert_eq!(group.filter, json!({"is_public": true}));
        assert_eq!(group.fields, vec!["texts.id"]);
    }

    #[test]
    fn unfiltered_relation_stays_in_local_populate() {
        let registry = spec_pair();
        // Authenticated viewer: the collection.texts filter in the fixture
        // registry only applies to anonymous viewers.
        let view = ViewDescription::fields(["id"]).relation("texts", ["id"]);
        let plan = compile(
            &view,
            registry.entity("collection").unwrap(),
            &registry,
            &FetchContext::for_user(7),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(plan.local_populate, vec!["texts"]);
        assert!(plan.filtered_populates.is_empty());
    }

    #[test]
    fn context_and_override_merge_under_and() {
        let registry = spec_pair();
        let view = ViewDescription::fields(["id"]).relation("texts", ["id"]);
        let overrides: RelationFilters =
            HashMap::from([("texts".to_string(), json!({"author_id": 7}))]);
        let plan = compile(
            &view,
            registry.entity("collection").unwrap(),
            &registry,
            &anon(),
            &overrides,
        )
        .unwrap();
        assert_eq!(
            plan.filtered_populates[0].filter,
            json!({"$and": [{"is_public": true}, {"author_id": 7}]})
        );
    }

    #[test]
    fn override_alone_applies_exactly() {
        let registry = spec_pair();
        let view = ViewDescription::fields(["id"]).relation("vocabs", ["id"]);
        let overrides: RelationFilters =
            HashMap::from([("vocabs".to_string(), json!({"language_code": "de"}))]);
        let plan = compile(
            &view,
            registry.entity("text").unwrap(),
            &registry,
            &anon(),
            &overrides,
        )
        .unwrap();
        assert_eq!(plan.filtered_populates[0].filter, json!({"language_code": "de"}));
    }

    #[test]
    fn unknown_field_fails_compilation() {
        let registry = spec_pair();
        let view = ViewDescription::fields(["id", "no_such_field"]);
        let err = compile(
            &view,
            registry.entity("text").unwrap(),
            &registry,
            &anon(),
            &HashMap::new(),
        )
        .unwrap_err();
        match err {
            ViewError::InvalidViewField { field, .. } => assert_eq!(field, "no_such_field"),
            other => panic!("expected InvalidViewField, got {other}"),
        }
    }

    #[test]
    fn annotated_field_is_keyed_by_parent_prefix() {
        let (registry, counter) = spec_pair_with_annotator();
        let view = ViewDescription::fields(["id", "is_bookmarked"])
            .relation("collection", ViewDescription::fields(["id"]).relation("texts", vec!["id", "is_bookmarked"]));
        let plan = compile(
            &view,
            registry.entity("text").unwrap(),
            &registry,
            &FetchContext::for_user(1),
            &HashMap::new(),
        )
        .unwrap();
        let paths: Vec<_> = plan.annotated_fields.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["", "collection.texts"]);
        assert_eq!(counter.invocations(), 0);
    }

    #[test]
    fn stale_relation_key_is_skipped() {
        let registry = spec_pair();
        let view = ViewDescription::fields(["id"]).relation("nonexistent", ["id"]);
        let plan = compile(
            &view,
            registry.entity("text").unwrap(),
            &registry,
            &anon(),
            &HashMap::new(),
        )
        .unwrap();
        assert!(plan.local_populate.is_empty());
        assert!(plan.filtered_populates.is_empty());
    }

    #[test]
    fn nested_filtered_group_propagates_after_parent() {
        let registry = spec_pair();
        // collection (anonymous ⇒ filtered texts) nested under an
        // unconditional to-one: the group's paths stay absolute.
        let view = ViewDescription::fields(["id"]).relation(
            "collection",
            ViewDescription::fields(["id"]).relation("texts", ["id", "title"]),
        );
        let plan = compile(
            &view,
            registry.entity("text").unwrap(),
            &registry,
            &anon(),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(plan.local_populate, vec!["collection"]);
        assert_eq!(plan.filtered_populates.len(), 1);
        assert_eq!(plan.filtered_populates[0].populate, vec!["collection.texts"]);
        assert_eq!(
            plan.filtered_populates[0].fields,
            vec!["collection.texts.id", "collection.texts.title"]
        );
    }
}
