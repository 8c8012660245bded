//! Field fetch specs: the static, per-entity-type description of how each
//! exposed field is obtained. Registered once at startup and never mutated.
//!
//! Entity specs reference each other by entity-type key through the registry
//! rather than by direct nesting, so mutually recursive graphs (text →
//! collection → text) wire up without eager construction. Registration is
//! two-phase: declare every spec, then `build()` checks the cross-references.

use crate::context::FetchContext;
use crate::error::SpecError;
use crate::view::annotate::Annotator;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Relation cardinality: to-one (we hold the foreign key) or to-many (the
/// target holds a foreign key to us).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// A context-dependent query constraint on a relation, e.g. a visibility rule.
pub type ContextFilterFn = Arc<dyn Fn(&FetchContext) -> Option<Value> + Send + Sync>;

pub struct RelationSpec {
    /// Entity-type key of the related spec in the registry.
    pub target: String,
    pub cardinality: Cardinality,
    /// Property name the relation is populated under when it differs from the
    /// field key. Paths are built from this name.
    pub populate_as: Option<String>,
    /// Join column on this entity (FK for to-one, usually the pk for to-many).
    pub our_key: String,
    /// Join column on the target (pk for to-one, FK for to-many).
    pub their_key: String,
    pub context_filter: Option<ContextFilterFn>,
}

impl std::fmt::Debug for RelationSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationSpec")
            .field("target", &self.target)
            .field("cardinality", &self.cardinality)
            .field("populate_as", &self.populate_as)
            .field("our_key", &self.our_key)
            .field("their_key", &self.their_key)
            .field("context_filter", &self.context_filter.is_some())
            .finish()
    }
}

impl RelationSpec {
    pub fn to_one(target: impl Into<String>, our_key: impl Into<String>, their_key: impl Into<String>) -> Self {
        Self::new(target, Cardinality::ToOne, our_key, their_key)
    }

    pub fn to_many(target: impl Into<String>, our_key: impl Into<String>, their_key: impl Into<String>) -> Self {
        Self::new(target, Cardinality::ToMany, our_key, their_key)
    }

    fn new(
        target: impl Into<String>,
        cardinality: Cardinality,
        our_key: impl Into<String>,
        their_key: impl Into<String>,
    ) -> Self {
        RelationSpec {
            target: target.into(),
            cardinality,
            populate_as: None,
            our_key: our_key.into(),
            their_key: their_key.into(),
            context_filter: None,
        }
    }

    pub fn populated_as(mut self, name: impl Into<String>) -> Self {
        self.populate_as = Some(name.into());
        self
    }

    pub fn with_context_filter(
        mut self,
        f: impl Fn(&FetchContext) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.context_filter = Some(Arc::new(f));
        self
    }
}

/// How one exposed field is obtained.
pub enum FieldFetchSpec {
    /// Stored directly on the entity row.
    DbColumn,
    /// Computed by the database at query time; `expr` is a scalar SQL
    /// expression over the primary table alias `t`.
    Formula { expr: String },
    Relation(RelationSpec),
    /// Filled in after the primary fetch by an async annotator.
    Annotated(Arc<dyn Annotator>),
}

impl std::fmt::Debug for FieldFetchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldFetchSpec::DbColumn => write!(f, "DbColumn"),
            FieldFetchSpec::Formula { expr } => f.debug_struct("Formula").field("expr", expr).finish(),
            FieldFetchSpec::Relation(rel) => f.debug_tuple("Relation").field(rel).finish(),
            FieldFetchSpec::Annotated(a) => f.debug_tuple("Annotated").field(&a.name()).finish(),
        }
    }
}

/// Physical table facts the persistence layer needs for an entity type.
#[derive(Clone, Debug)]
pub struct TableMeta {
    pub schema: String,
    pub table: String,
    pub pk: String,
    /// Column → SQL type for bind casts (e.g. "created_at" → "timestamptz").
    pub casts: HashMap<String, String>,
}

impl TableMeta {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, pk: impl Into<String>) -> Self {
        TableMeta {
            schema: schema.into(),
            table: table.into(),
            pk: pk.into(),
            casts: HashMap::new(),
        }
    }

    pub fn cast(mut self, column: impl Into<String>, pg_type: impl Into<String>) -> Self {
        self.casts.insert(column.into(), pg_type.into());
        self
    }
}

/// The fetch spec of one entity type: field map plus table facts.
#[derive(Debug)]
pub struct EntityFetchSpec {
    pub entity_type: String,
    pub table: TableMeta,
    fields: Vec<(String, FieldFetchSpec)>,
}

impl EntityFetchSpec {
    pub fn new(entity_type: impl Into<String>, table: TableMeta) -> Self {
        EntityFetchSpec {
            entity_type: entity_type.into(),
            table,
            fields: Vec::new(),
        }
    }

    pub fn column(self, name: impl Into<String>) -> Self {
        self.field(name, FieldFetchSpec::DbColumn)
    }

    pub fn formula(self, name: impl Into<String>, expr: impl Into<String>) -> Self {
        self.field(name, FieldFetchSpec::Formula { expr: expr.into() })
    }

    pub fn relation(self, key: impl Into<String>, rel: RelationSpec) -> Self {
        self.field(key, FieldFetchSpec::Relation(rel))
    }

    pub fn annotated(self, name: impl Into<String>, annotator: Arc<dyn Annotator>) -> Self {
        self.field(name, FieldFetchSpec::Annotated(annotator))
    }

    fn field(mut self, name: impl Into<String>, spec: FieldFetchSpec) -> Self {
        self.fields.push((name.into(), spec));
        self
    }

    pub fn spec(&self, field: &str) -> Option<&FieldFetchSpec> {
        self.fields.iter().find(|(k, _)| k == field).map(|(_, s)| s)
    }

    pub fn relation_spec(&self, key: &str) -> Option<&RelationSpec> {
        match self.spec(key) {
            Some(FieldFetchSpec::Relation(rel)) => Some(rel),
            _ => None,
        }
    }

    /// Property name a relation field populates under (defaults to the key).
    pub fn populate_property<'a>(&'a self, key: &'a str) -> &'a str {
        match self.relation_spec(key) {
            Some(RelationSpec {
                populate_as: Some(name),
                ..
            }) => name,
            _ => key,
        }
    }

    /// Resolve a path segment: field-key lookup first, then populate-property
    /// lookup for relations whose property name diverges from the key.
    pub fn segment_spec(&self, segment: &str) -> Option<&FieldFetchSpec> {
        self.spec(segment).or_else(|| {
            self.fields
                .iter()
                .find(|(_, s)| {
                    matches!(s, FieldFetchSpec::Relation(rel) if rel.populate_as.as_deref() == Some(segment))
                })
                .map(|(_, s)| s)
        })
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Names of the plain-column fields, i.e. the selectable physical columns.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, s)| matches!(s, FieldFetchSpec::DbColumn))
            .map(|(k, _)| k.as_str())
    }
}

/// Read-only table of entity fetch specs, injected into the orchestrator.
#[derive(Debug)]
pub struct FetchSpecRegistry {
    by_type: HashMap<String, EntityFetchSpec>,
}

impl FetchSpecRegistry {
    pub fn builder() -> FetchSpecRegistryBuilder {
        FetchSpecRegistryBuilder { specs: Vec::new() }
    }

    pub fn get(&self, entity_type: &str) -> Option<&EntityFetchSpec> {
        self.by_type.get(entity_type)
    }

    pub fn entity(&self, entity_type: &str) -> Result<&EntityFetchSpec, SpecError> {
        self.by_type
            .get(entity_type)
            .ok_or_else(|| SpecError::UnknownEntityType(entity_type.to_string()))
    }

    /// The entity spec governing the records at a dotted relation path from
    /// `root` ("" → `root` itself). Walks specs only, not records.
    pub fn entity_at_path<'a>(
        &'a self,
        root: &'a EntityFetchSpec,
        path: &str,
    ) -> Result<&'a EntityFetchSpec, crate::error::ViewError> {
        use crate::error::ViewError;
        let mut entity = root;
        if path.is_empty() {
            return Ok(entity);
        }
        let mut walked = String::new();
        for segment in path.split('.') {
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(segment);
            let rel = match entity.segment_spec(segment) {
                Some(FieldFetchSpec::Relation(rel)) => rel,
                Some(_) => {
                    return Err(ViewError::InvalidPath {
                        path: path.to_string(),
                        reason: "non-relation field encountered",
                        at: walked,
                    })
                }
                None => {
                    return Err(ViewError::InvalidPath {
                        path: path.to_string(),
                        reason: "field fetch spec not found",
                        at: walked,
                    })
                }
            };
            entity = match self.by_type.get(&rel.target) {
                Some(e) => e,
                None => {
                    return Err(ViewError::InvalidPath {
                        path: path.to_string(),
                        reason: "field fetch spec not found",
                        at: walked,
                    })
                }
            };
        }
        Ok(entity)
    }
}

/// Declare-then-wire builder: `register` collects specs, `build` validates
/// duplicates and relation targets so cyclic spec graphs are safe to author.
pub struct FetchSpecRegistryBuilder {
    specs: Vec<EntityFetchSpec>,
}

impl FetchSpecRegistryBuilder {
    pub fn register(mut self, spec: EntityFetchSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn build(self) -> Result<FetchSpecRegistry, SpecError> {
        let mut by_type: HashMap<String, EntityFetchSpec> = HashMap::new();
        for spec in self.specs {
            let mut seen = std::collections::HashSet::new();
            for name in spec.field_names() {
                if !seen.insert(name.to_string()) {
                    return Err(SpecError::DuplicateField {
                        entity: spec.entity_type.clone(),
                        field: name.to_string(),
                    });
                }
            }
            if by_type.contains_key(&spec.entity_type) {
                return Err(SpecError::DuplicateEntityType(spec.entity_type));
            }
            by_type.insert(spec.entity_type.clone(), spec);
        }
        for spec in by_type.values() {
            for key in spec.field_names().map(str::to_string).collect::<Vec<_>>() {
                if let Some(rel) = spec.relation_spec(&key) {
                    if !by_type.contains_key(&rel.target) {
                        return Err(SpecError::UnknownRelationTarget {
                            entity: spec.entity_type.clone(),
                            relation: key,
                            target: rel.target.clone(),
                        });
                    }
                }
            }
        }
        Ok(FetchSpecRegistry { by_type })
    }
}
