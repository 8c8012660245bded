//! Test harness: an in-memory Repository over fixture rows, plus recording
//! annotators. Rows materialize to one shared record instance per (type, pk),
//! so the same row reached through two relation paths aliases for real.

use async_trait::async_trait;
use lingua_sdk::{
    resolve_at_path, Annotator, AppError, Cardinality, EntityFetchSpec, FetchContext,
    FetchSpecRegistry, FieldFetchSpec, Populated, Record, RelationSpec, Repository, TableMeta,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq)]
pub enum RepoCall {
    Find { populate: Vec<String> },
    Populate { paths: Vec<String>, filter: Option<Value> },
}

pub struct MemoryRepository {
    registry: Arc<FetchSpecRegistry>,
    rows: HashMap<String, Vec<Map<String, Value>>>,
    materialized: Mutex<HashMap<(String, String), Record>>,
    pub calls: Mutex<Vec<RepoCall>>,
}

impl MemoryRepository {
    pub fn new(registry: Arc<FetchSpecRegistry>) -> Self {
        MemoryRepository {
            registry,
            rows: HashMap::new(),
            materialized: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_row(mut self, entity_type: &str, row: Value) -> Self {
        let obj = row.as_object().cloned().expect("fixture row must be an object");
        self.rows.entry(entity_type.to_string()).or_default().push(obj);
        self
    }

    pub fn recorded_calls(&self) -> Vec<RepoCall> {
        self.calls.lock().unwrap().clone()
    }

    fn materialize(&self, entity_type: &str, pk_field: &str, row: &Map<String, Value>) -> Record {
        let pk = row.get(pk_field).cloned().unwrap_or(Value::Null).to_string();
        self.materialized
            .lock()
            .unwrap()
            .entry((entity_type.to_string(), pk))
            .or_insert_with(|| Record::from_values(row.clone()))
            .clone()
    }

    fn populate_one(
        &self,
        entity_type: &str,
        roots: &[Record],
        path: &str,
        filter: Option<&Value>,
    ) -> Result<(), AppError> {
        let root_entity = self.registry.entity(entity_type)?;
        let (prefix, segment) = match path.rfind('.') {
            Some(i) => (&path[..i], &path[i + 1..]),
            None => ("", path),
        };
        let parents = resolve_at_path(root_entity, &self.registry, prefix, roots)?;
        let parent_entity = self.registry.entity_at_path(root_entity, prefix)?;
        let rel = match parent_entity.segment_spec(segment) {
            Some(FieldFetchSpec::Relation(rel)) => rel,
            _ => panic!("populate path '{path}' must name a relation"),
        };
        let target = self.registry.entity(&rel.target)?;
        let empty = Vec::new();
        let target_rows = self.rows.get(&rel.target).unwrap_or(&empty);
        for parent in &parents {
            let Some(key) = parent.get(&rel.our_key) else { continue };
            let children: Vec<Record> = target_rows
                .iter()
                .filter(|row| row.get(&rel.their_key) == Some(&key))
                .filter(|row| filter.map_or(true, |f| matches(f, row)))
                .map(|row| self.materialize(&rel.target, &target.table.pk, row))
                .collect();
            match rel.cardinality {
                Cardinality::ToMany => {
                    parent.set_relation(segment, Populated::Many(children));
                }
                Cardinality::ToOne => {
                    if let Some(child) = children.into_iter().next() {
                        parent.set_relation(segment, Populated::One(child));
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find(
        &self,
        entity_type: &str,
        where_: &Value,
        _fields: &[String],
        populate: &[String],
    ) -> Result<Vec<Record>, AppError> {
        self.calls.lock().unwrap().push(RepoCall::Find {
            populate: populate.to_vec(),
        });
        let entity = self.registry.entity(entity_type)?;
        let empty = Vec::new();
        let records: Vec<Record> = self
            .rows
            .get(entity_type)
            .unwrap_or(&empty)
            .iter()
            .filter(|row| matches(where_, row))
            .map(|row| self.materialize(entity_type, &entity.table.pk, row))
            .collect();
        for path in populate {
            self.populate_one(entity_type, &records, path, None)?;
        }
        Ok(records)
    }

    async fn populate(
        &self,
        entity_type: &str,
        records: &[Record],
        paths: &[String],
        where_: Option<&Value>,
        _fields: &[String],
    ) -> Result<(), AppError> {
        self.calls.lock().unwrap().push(RepoCall::Populate {
            paths: paths.to_vec(),
            filter: where_.cloned(),
        });
        for (i, path) in paths.iter().enumerate() {
            let filter = if i == 0 { where_ } else { None };
            self.populate_one(entity_type, records, path, filter)?;
        }
        Ok(())
    }
}

/// Evaluate a JSON-shaped filter against a fixture row: equality, `$and`,
/// `$or`, `$in`, null.
pub fn matches(filter: &Value, row: &Map<String, Value>) -> bool {
    let Some(obj) = filter.as_object() else {
        return false;
    };
    obj.iter().all(|(key, val)| match key.as_str() {
        "$and" => val
            .as_array()
            .is_some_and(|arms| arms.iter().all(|arm| matches(arm, row))),
        "$or" => val
            .as_array()
            .is_some_and(|arms| arms.iter().any(|arm| matches(arm, row))),
        col => match val {
            Value::Object(inner) => inner
                .get("$in")
                .and_then(Value::as_array)
                .is_some_and(|vals| row.get(col).is_some_and(|rv| vals.contains(rv))),
            Value::Null => row.get(col).map_or(true, Value::is_null),
            scalar => row.get(col) == Some(scalar),
        },
    })
}

/// Annotator that records invocation order and slice sizes, and writes
/// `field = (viewer is authenticated)` on every record. Anonymous viewers
/// therefore read `false`, with no backing query at all.
pub struct TestAnnotator {
    name: &'static str,
    field: &'static str,
    order: Arc<Mutex<Vec<&'static str>>>,
    sizes: Mutex<Vec<usize>>,
}

impl TestAnnotator {
    pub fn new(
        name: &'static str,
        field: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<Self> {
        Arc::new(TestAnnotator {
            name,
            field,
            order,
            sizes: Mutex::new(Vec::new()),
        })
    }

    pub fn invocations(&self) -> usize {
        self.sizes.lock().unwrap().len()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Annotator for TestAnnotator {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn annotate(&self, records: &[Record], ctx: &FetchContext) -> Result<(), AppError> {
        self.order.lock().unwrap().push(self.name);
        self.sizes.lock().unwrap().push(records.len());
        for r in records {
            r.set(self.field, Value::Bool(ctx.user.is_some()));
        }
        Ok(())
    }
}

/// The fixture registry plus handles on its annotators.
pub struct TestWorld {
    pub registry: Arc<FetchSpecRegistry>,
    pub order: Arc<Mutex<Vec<&'static str>>>,
    pub bookmark: Arc<TestAnnotator>,
    pub histogram: Arc<TestAnnotator>,
    pub level: Arc<TestAnnotator>,
}

/// text ↔ collection ↔ text plus vocab, with the usual visibility filter on
/// collection.texts (anonymous viewers: public only).
pub fn world() -> TestWorld {
    let order = Arc::new(Mutex::new(Vec::new()));
    let bookmark = TestAnnotator::new("is_bookmarked", "is_bookmarked", order.clone());
    let histogram = TestAnnotator::new("vocabs_by_level", "vocabs_by_level", order.clone());
    let level = TestAnnotator::new("level", "level", order.clone());

    let text = EntityFetchSpec::new("text", TableMeta::new("public", "texts", "id"))
        .column("id")
        .column("title")
        .column("language_code")
        .column("author_id")
        .column("collection_id")
        .column("is_public")
        .relation("collection", RelationSpec::to_one("collection", "collection_id", "id"))
        .relation("vocabs", RelationSpec::to_many("vocab", "id", "text_id"))
        .annotated("is_bookmarked", bookmark.clone())
        .annotated("vocabs_by_level", histogram.clone());

    let collection = EntityFetchSpec::new("collection", TableMeta::new("public", "collections", "id"))
        .column("id")
        .column("title")
        .column("author_id")
        .column("is_public")
        .relation(
            "texts",
            RelationSpec::to_many("text", "id", "collection_id").with_context_filter(|ctx| {
                match ctx.user_id() {
                    None => Some(json!({"is_public": true})),
                    Some(_) => None,
                }
            }),
        );

    let vocab = EntityFetchSpec::new("vocab", TableMeta::new("public", "vocabs", "id"))
        .column("id")
        .column("term")
        .column("language_code")
        .column("text_id")
        .relation("text", RelationSpec::to_one("text", "text_id", "id"))
        .annotated("level", level.clone());

    let registry = FetchSpecRegistry::builder()
        .register(text)
        .register(collection)
        .register(vocab)
        .build()
        .expect("test registry wires");

    TestWorld {
        registry: Arc::new(registry),
        order,
        bookmark,
        histogram,
        level,
    }
}

/// Standard dataset: one collection with five texts (two public), two vocabs.
pub fn seeded_repo(world: &TestWorld) -> MemoryRepository {
    MemoryRepository::new(world.registry.clone())
        .with_row(
            "collection",
            json!({"id": 9, "title": "Fables", "author_id": 1, "is_public": true}),
        )
        .with_row(
            "text",
            json!({"id": 1, "title": "Der Fuchs", "language_code": "de", "author_id": 1, "collection_id": 9, "is_public": true}),
        )
        .with_row(
            "text",
            json!({"id": 2, "title": "Die Kraehe", "language_code": "de", "author_id": 2, "collection_id": 9, "is_public": true}),
        )
        .with_row(
            "text",
            json!({"id": 3, "title": "Entwurf", "language_code": "de", "author_id": 1, "collection_id": 9, "is_public": false}),
        )
        .with_row(
            "text",
            json!({"id": 4, "title": "Geheim", "language_code": "de", "author_id": 2, "collection_id": 9, "is_public": false}),
        )
        .with_row(
            "text",
            json!({"id": 5, "title": "Notizen", "language_code": "de", "author_id": 3, "collection_id": 9, "is_public": false}),
        )
        .with_row(
            "vocab",
            json!({"id": 10, "term": "Fuchs", "language_code": "de", "text_id": 1}),
        )
        .with_row(
            "vocab",
            json!({"id": 11, "term": "Kraehe", "language_code": "de", "text_id": 2}),
        )
}
