//! Storage adapter contract
//!
//! The sideloader never builds physical queries. It asks an adapter for a
//! base scope, narrows it with logical `filter`, `order` and `paginate`
//! steps, then `resolve`s it into records.
//!
//! - [`memory`] - in-memory tables, used by tests and fixture files
//! - [`rest`] - JSON:API-style REST backend over HTTP

pub mod memory;
pub mod rest;

pub use memory::{MemoryAdapter, MemoryScope};
pub use rest::{RestAdapter, RestScope};

use crate::error::AdapterError;
use crate::query::Direction;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;

/// Canonical string form of an id or foreign key value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a scalar JSON value; null and composite values have none
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            Value::Bool(b) => Some(Self(b.to_string())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Ordered set of keys handed to scope providers
pub type KeySet = BTreeSet<RecordKey>;

/// One fetched row
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub resource: String,
    pub id: RecordKey,
    pub attributes: Map<String, Value>,
}

impl Record {
    /// Build a record from a JSON object carrying an `id` field
    pub fn from_json(resource: &str, value: Value) -> Result<Self, AdapterError> {
        let Value::Object(attributes) = value else {
            return Err(AdapterError::Decode(format!(
                "{} row is not an object",
                resource
            )));
        };

        let id = attributes
            .get("id")
            .and_then(RecordKey::from_value)
            .ok_or_else(|| AdapterError::Decode(format!("{} row has no usable id", resource)))?;

        Ok(Self {
            resource: resource.to_string(),
            id,
            attributes,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Key stored under `field`; `id` always resolves to the record id
    pub fn key(&self, field: &str) -> Option<RecordKey> {
        if field == "id" {
            return Some(self.id.clone());
        }
        self.get(field).and_then(RecordKey::from_value)
    }
}

/// Logical filter: `field` must equal one of `values`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub field: String,
    pub values: Vec<String>,
}

impl Constraint {
    pub fn new(field: &str, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn any_of(field: &str, keys: &KeySet) -> Self {
        Self::new(field, keys.iter().map(|k| k.as_str().to_string()))
    }

    pub fn matches(&self, record: &Record) -> bool {
        record
            .key(&self.field)
            .is_some_and(|key| self.values.iter().any(|v| v == key.as_str()))
    }
}

/// Operations a storage backend must provide
pub trait StorageAdapter: Send + Sync {
    type Scope: Clone + fmt::Debug + Send + Sync;

    fn base_scope(&self, resource: &str) -> Self::Scope;

    fn filter(&self, scope: Self::Scope, field: &str, values: &[String]) -> Self::Scope;

    fn order(&self, scope: Self::Scope, field: &str, direction: Direction) -> Self::Scope;

    fn paginate(&self, scope: Self::Scope, number: u32, size: u32) -> Self::Scope;

    fn resolve(
        &self,
        scope: Self::Scope,
    ) -> impl Future<Output = Result<Vec<Record>, AdapterError>> + Send;

    fn attribute(&self, record: &Record, name: &str) -> Option<Value> {
        record.get(name).cloned()
    }
}
