//! Query Spec
//!
//! Typed, per-resource query parameters produced by the parameter resolver.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// One sort key: attribute plus direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Desc,
        }
    }

    /// Parse a comma-delimited sort string; a leading `-` means descending
    pub fn parse_list(input: &str) -> Vec<SortKey> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "-")
            .map(|s| match s.strip_prefix('-') {
                Some(field) => SortKey::desc(field),
                None => SortKey::asc(s),
            })
            .collect()
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Asc => write!(f, "{}", self.field),
            Direction::Desc => write!(f, "-{}", self.field),
        }
    }
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn new(number: u32, size: u32) -> Self {
        Self { number, size }
    }
}

/// Resolved query parameters for one resource type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    /// field -> accepted values (OR within a field, AND across fields)
    pub filters: BTreeMap<String, Vec<String>>,
    pub sort: Vec<SortKey>,
    /// Explicit page; `None` leaves the choice to registry defaults
    pub page: Option<Page>,
    /// Replaces the default attribute set when present
    pub fields: Option<Vec<String>>,
    /// Added on top of whichever attribute set is active
    pub extra_fields: Vec<String>,
}

/// Per-type attribute lists keyed by resource type
pub type FieldsByType = BTreeMap<String, Vec<String>>;

/// Query specs for every type a request references
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpecs {
    specs: BTreeMap<String, QuerySpec>,
}

impl QuerySpecs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: &str, spec: QuerySpec) {
        self.specs.insert(resource.to_string(), spec);
    }

    pub fn get(&self, resource: &str) -> Option<&QuerySpec> {
        self.specs.get(resource)
    }

    /// Spec for a type, or an empty one when the request never mentions it
    pub fn spec_for(&self, resource: &str) -> QuerySpec {
        self.specs.get(resource).cloned().unwrap_or_default()
    }

    pub fn fields_by_type(&self) -> FieldsByType {
        self.specs
            .iter()
            .filter_map(|(name, spec)| spec.fields.clone().map(|f| (name.clone(), f)))
            .collect()
    }

    pub fn extra_fields_by_type(&self) -> FieldsByType {
        self.specs
            .iter()
            .filter(|(_, spec)| !spec.extra_fields.is_empty())
            .map(|(name, spec)| (name.clone(), spec.extra_fields.clone()))
            .collect()
    }
}
