//! In-memory storage adapter
//!
//! Tables of JSON rows keyed by resource type. Rows keep insertion order,
//! which is the adapter-native order used to break sort ties.

use super::{Constraint, Record, StorageAdapter};
use crate::error::AdapterError;
use crate::query::Direction;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::Path;

/// Accumulated logical query against one table
#[derive(Debug, Clone)]
pub struct MemoryScope {
    pub resource: String,
    pub filters: Vec<Constraint>,
    pub order: Vec<(String, Direction)>,
    pub page: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    tables: HashMap<String, Vec<Record>>,
    failing: HashSet<String>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append JSON rows to a table
    pub fn insert(
        &mut self,
        resource: &str,
        rows: impl IntoIterator<Item = Value>,
    ) -> Result<(), AdapterError> {
        let table = self.tables.entry(resource.to_string()).or_default();
        for row in rows {
            table.push(Record::from_json(resource, row)?);
        }
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with_table(
        mut self,
        resource: &str,
        rows: impl IntoIterator<Item = Value>,
    ) -> Result<Self, AdapterError> {
        self.insert(resource, rows)?;
        Ok(self)
    }

    /// Make every resolve against `resource` fail
    pub fn fail_on(mut self, resource: &str) -> Self {
        self.failing.insert(resource.to_string());
        self
    }

    /// Parse a YAML or JSON fixture: a map from resource type to row list
    pub fn from_fixture_str(content: &str) -> Result<Self, AdapterError> {
        let tables: BTreeMap<String, Vec<Value>> =
            serde_yaml::from_str(content).map_err(|e| AdapterError::Decode(e.to_string()))?;

        let mut adapter = Self::new();
        for (resource, rows) in tables {
            adapter.insert(&resource, rows)?;
        }
        Ok(adapter)
    }

    pub fn load(path: &Path) -> Result<Self, AdapterError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AdapterError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Self::from_fixture_str(&content)
    }

    fn run(&self, scope: &MemoryScope) -> Result<Vec<Record>, AdapterError> {
        if self.failing.contains(&scope.resource) {
            return Err(AdapterError::Unavailable(format!(
                "table {} is offline",
                scope.resource
            )));
        }

        let mut rows: Vec<Record> = self
            .tables
            .get(&scope.resource)
            .map(|table| {
                table
                    .iter()
                    .filter(|row| scope.filters.iter().all(|c| c.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // sort_by is stable, so ties keep insertion order
        if !scope.order.is_empty() {
            rows.sort_by(|a, b| {
                scope
                    .order
                    .iter()
                    .map(|(field, direction)| {
                        let ord = compare_values(field_value(a, field), field_value(b, field));
                        match direction {
                            Direction::Asc => ord,
                            Direction::Desc => ord.reverse(),
                        }
                    })
                    .find(|ord| ord.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        if let Some((number, size)) = scope.page {
            let skip = (number.saturating_sub(1) as usize).saturating_mul(size as usize);
            rows = rows.into_iter().skip(skip).take(size as usize).collect();
        }

        Ok(rows)
    }
}

impl StorageAdapter for MemoryAdapter {
    type Scope = MemoryScope;

    fn base_scope(&self, resource: &str) -> MemoryScope {
        MemoryScope {
            resource: resource.to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            page: None,
        }
    }

    fn filter(&self, mut scope: MemoryScope, field: &str, values: &[String]) -> MemoryScope {
        scope.filters.push(Constraint::new(field, values.iter().cloned()));
        scope
    }

    fn order(&self, mut scope: MemoryScope, field: &str, direction: Direction) -> MemoryScope {
        scope.order.push((field.to_string(), direction));
        scope
    }

    fn paginate(&self, mut scope: MemoryScope, number: u32, size: u32) -> MemoryScope {
        scope.page = Some((number, size));
        scope
    }

    fn resolve(
        &self,
        scope: MemoryScope,
    ) -> impl Future<Output = Result<Vec<Record>, AdapterError>> + Send {
        std::future::ready(self.run(&scope))
    }
}

fn field_value<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    record.get(field).filter(|v| !v.is_null())
}

/// Nulls first, numbers numerically, everything else by type then text
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => type_rank(x)
            .cmp(&type_rank(y))
            .then_with(|| x.to_string().cmp(&y.to_string())),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
