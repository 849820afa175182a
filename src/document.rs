//! Compound Document
//!
//! Renders an executed plan into `{data, included}`. The base node's records
//! become `data`; every record below it lands in `included` once per
//! `(type, id)`, and records already in `data` are not repeated. Linkage
//! from every node a record was reached through is merged onto its single
//! resource object: to-many lists are unioned in encounter order, and a
//! to-one keeps the first non-null identifier.
//!
//! Attribute selection per type:
//! - default: the type's declared attributes
//! - `fields[type]` replaces the default set; only default attributes count
//! - `extra_fields[type]` is always added on top, and is the only way to
//!   get an extra attribute

use crate::query::FieldsByType;
use crate::resource::Registry;
use crate::sideload::{Linkage, PlanNode, ResourceIdentifier};
use crate::storage::{Record, RecordKey, StorageAdapter};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    pub data: Vec<ResourceObject>,
    pub included: Vec<ResourceObject>,
}

impl Document {
    /// Resource object for `(resource, id)` in either section
    pub fn find(&self, resource: &str, id: &str) -> Option<&ResourceObject> {
        self.data
            .iter()
            .chain(&self.included)
            .find(|obj| obj.resource == resource && obj.id.as_str() == id)
    }

    pub fn included_of(&self, resource: &str) -> impl Iterator<Item = &ResourceObject> {
        let resource = resource.to_string();
        self.included.iter().filter(move |obj| obj.resource == resource)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub resource: String,
    pub id: RecordKey,
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipObject {
    pub data: Linkage,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Data(usize),
    Included(usize),
}

/// Render the executed plan rooted at `root`
pub fn render<A: StorageAdapter>(
    registry: &Registry,
    adapter: &A,
    root: &PlanNode,
    fields: &FieldsByType,
    extra_fields: &FieldsByType,
) -> Document {
    let mut renderer = Renderer {
        registry,
        adapter,
        fields,
        extra_fields,
        selections: HashMap::new(),
    };
    let mut document = Document::default();
    let mut seen: HashMap<ResourceIdentifier, Slot> = HashMap::new();

    let nodes = std::iter::once(root).chain(root.descendants());
    for (depth, node) in nodes.enumerate() {
        for record in &node.records {
            let ident = ResourceIdentifier::of(record);
            let relationships = relationships_of(node, &record.id);

            match seen.get(&ident).copied() {
                Some(slot) => {
                    let existing = match slot {
                        Slot::Data(i) => &mut document.data[i],
                        Slot::Included(i) => &mut document.included[i],
                    };
                    for (name, rel) in relationships {
                        match existing.relationships.get_mut(&name) {
                            Some(current) => merge_linkage(&mut current.data, rel.data),
                            None => {
                                existing.relationships.insert(name, rel);
                            }
                        }
                    }
                }
                None => {
                    let object = ResourceObject {
                        resource: record.resource.clone(),
                        id: record.id.clone(),
                        attributes: renderer.attributes(record),
                        relationships,
                    };
                    let slot = if depth == 0 {
                        document.data.push(object);
                        Slot::Data(document.data.len() - 1)
                    } else {
                        document.included.push(object);
                        Slot::Included(document.included.len() - 1)
                    };
                    seen.insert(ident, slot);
                }
            }
        }
    }

    tracing::debug!(
        "rendered {} data and {} included object(s)",
        document.data.len(),
        document.included.len()
    );
    document
}

fn relationships_of(node: &PlanNode, id: &RecordKey) -> BTreeMap<String, RelationshipObject> {
    node.linkage
        .get(id)
        .map(|links| {
            links
                .iter()
                .map(|(name, data)| (name.clone(), RelationshipObject { data: data.clone() }))
                .collect()
        })
        .unwrap_or_default()
}

fn merge_linkage(current: &mut Linkage, other: Linkage) {
    match (current, other) {
        (Linkage::Many(ids), Linkage::Many(more)) => {
            for ident in more {
                if !ids.contains(&ident) {
                    ids.push(ident);
                }
            }
        }
        (Linkage::One(slot @ None), Linkage::One(Some(ident))) => *slot = Some(ident),
        _ => {}
    }
}

struct Renderer<'a, A> {
    registry: &'a Registry,
    adapter: &'a A,
    fields: &'a FieldsByType,
    extra_fields: &'a FieldsByType,
    /// Attribute names per type, computed once per render
    selections: HashMap<String, Vec<String>>,
}

impl<A: StorageAdapter> Renderer<'_, A> {
    fn attributes(&mut self, record: &Record) -> Map<String, Value> {
        if !self.selections.contains_key(&record.resource) {
            let names = self.select(&record.resource);
            self.selections.insert(record.resource.clone(), names);
        }

        let names = self
            .selections
            .get(&record.resource)
            .map(Vec::as_slice)
            .unwrap_or_default();
        names
            .iter()
            .map(|name| {
                let value = self.adapter.attribute(record, name).unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect()
    }

    fn select(&self, resource: &str) -> Vec<String> {
        let Some(def) = self.registry.resource(resource) else {
            return Vec::new();
        };

        let known = |name: &String, param: &str, declared: bool| {
            if !declared && name != "id" {
                tracing::warn!(
                    "{}[{}] names unknown attribute {}, ignoring",
                    param,
                    resource,
                    name
                );
            }
            declared
        };

        let mut names: Vec<String> = match self.fields.get(resource) {
            Some(fields) => fields
                .iter()
                .filter(|n| known(*n, "fields", def.attributes.contains(*n)))
                .cloned()
                .collect(),
            None => def.attributes.clone(),
        };

        for name in self.extra_fields.get(resource).into_iter().flatten() {
            if known(name, "extra_fields", def.declares_attribute(name)) && !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}
