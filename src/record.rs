//! In-memory record graph: schemaless rows plus their populated relations.
//!
//! Records use shared ownership: the same row reached through two relation
//! paths can be one instance, so a derived field written by an annotator is
//! visible everywhere the record appears.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A populated relation value on a record.
#[derive(Clone)]
pub enum Populated {
    One(Record),
    Many(Vec<Record>),
}

#[derive(Default)]
struct RecordInner {
    values: Map<String, Value>,
    relations: HashMap<String, Populated>,
}

/// A fetched entity row. Cheap to clone (shared handle).
#[derive(Clone, Default)]
pub struct Record(Arc<RwLock<RecordInner>>);

impl Record {
    pub fn from_values(values: Map<String, Value>) -> Self {
        Record(Arc::new(RwLock::new(RecordInner {
            values,
            relations: HashMap::new(),
        })))
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.read().values.get(field).cloned()
    }

    /// Set a column or derived field. Annotators use this to attach their
    /// computed values after the primary fetch.
    pub fn set(&self, field: impl Into<String>, value: Value) {
        self.write().values.insert(field.into(), value);
    }

    pub fn relation(&self, name: &str) -> Option<Populated> {
        self.read().relations.get(name).cloned()
    }

    pub fn set_relation(&self, name: impl Into<String>, populated: Populated) {
        self.write().relations.insert(name.into(), populated);
    }

    /// True when both handles point at the same underlying row instance.
    pub fn same_instance(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Project the record and its populated relations into a JSON value.
    /// The graphs built by `PgRepository` are trees; callers must not feed
    /// this a graph where a record is its own (transitive) relation.
    pub fn to_value(&self) -> Value {
        let inner = self.read();
        let mut map = inner.values.clone();
        for (name, populated) in &inner.relations {
            let v = match populated {
                Populated::One(r) => r.to_value(),
                Populated::Many(rs) => Value::Array(rs.iter().map(Record::to_value).collect()),
            };
            map.insert(name.clone(), v);
        }
        Value::Object(map)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RecordInner> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RecordInner> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Record {
    // Values only: relation graphs may alias, so a recursive Debug could not
    // terminate on every input.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Record").field(&self.read().values).finish()
    }
}
