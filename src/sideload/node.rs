//! Plan Nodes
//!
//! One node is one dependency-ordered fetch. A node's link describes how its
//! records hang off the parent's records; its children are created only
//! after its own records are known.

use crate::query::{IncludeTree, Page, QuerySpec};
use crate::resource::{GroupKey, ScopeProvider};
use crate::storage::{KeySet, Record, RecordKey};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// `(type, id)` pointer to a record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource: String,
    pub id: RecordKey,
}

impl ResourceIdentifier {
    pub fn of(record: &Record) -> Self {
        Self {
            resource: record.resource.clone(),
            id: record.id.clone(),
        }
    }
}

/// Resolved relationship data for one parent record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Linkage {
    One(Option<ResourceIdentifier>),
    Many(Vec<ResourceIdentifier>),
}

/// How the child keys were derived from the parent records
#[derive(Debug, Clone)]
pub enum LinkKeys {
    /// Children carry `foreign_key == parent.id`
    ChildForeignKey { foreign_key: String },
    /// Parent id -> child id, read from the parent's foreign key
    ParentForeignKey {
        targets: BTreeMap<RecordKey, RecordKey>,
    },
    /// Parent id -> child ids, read from a join lookup fetched first
    Join {
        owner_key: String,
        target_key: String,
        lookup: Box<PlanNode>,
        targets: BTreeMap<RecordKey, KeySet>,
    },
}

/// Edge from a parent node to this node
#[derive(Debug, Clone)]
pub struct ParentLink {
    /// Relationship name on the parent type
    pub relationship: String,
    pub cardinality: Cardinality,
    /// Set for polymorphic groups
    pub group: Option<GroupKey>,
    /// Parent ids this link covers
    pub parents: KeySet,
    pub keys: LinkKeys,
    pub scope: ScopeProvider,
}

impl ParentLink {
    /// Key set handed to the scope provider
    pub fn scope_keys(&self) -> KeySet {
        match &self.keys {
            LinkKeys::ChildForeignKey { .. } => self.parents.clone(),
            LinkKeys::ParentForeignKey { targets } => targets.values().cloned().collect(),
            LinkKeys::Join { targets, .. } => targets.values().flatten().cloned().collect(),
        }
    }
}

/// One fetch in a sideload plan
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub resource: String,
    /// `None` for the base node
    pub link: Option<ParentLink>,
    pub spec: QuerySpec,
    pub page: Option<Page>,
    /// Includes still to expand below this node
    pub includes: IncludeTree,
    pub children: Vec<PlanNode>,
    pub records: Vec<Record>,
    /// Parent record id -> relationship name -> linkage
    pub linkage: BTreeMap<RecordKey, BTreeMap<String, Linkage>>,
}

impl PlanNode {
    pub fn new(resource: &str, spec: QuerySpec, page: Option<Page>, includes: IncludeTree) -> Self {
        Self {
            resource: resource.to_string(),
            link: None,
            spec,
            page,
            includes,
            children: Vec::new(),
            records: Vec::new(),
            linkage: BTreeMap::new(),
        }
    }

    pub fn with_link(mut self, link: ParentLink) -> Self {
        self.link = Some(link);
        self
    }

    pub fn ids(&self) -> KeySet {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    /// Nodes below this one, depth-first, excluding join lookups
    pub fn descendants(&self) -> Vec<&PlanNode> {
        let mut out = Vec::new();
        for child in &self.children {
            out.push(child);
            out.extend(child.descendants());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Record;
    use serde_json::json;

    fn link(keys: LinkKeys, parents: &[&str]) -> ParentLink {
        ParentLink {
            relationship: "books".into(),
            cardinality: Cardinality::Many,
            group: None,
            parents: parents.iter().map(|p| RecordKey::from(*p)).collect(),
            keys,
            scope: ScopeProvider::match_keys("author_id"),
        }
    }

    #[test]
    fn test_child_key_link_scopes_by_parent_ids() {
        let link = link(
            LinkKeys::ChildForeignKey {
                foreign_key: "author_id".into(),
            },
            &["1", "2"],
        );
        assert_eq!(link.scope_keys().len(), 2);
    }

    #[test]
    fn test_parent_key_link_scopes_by_target_ids() {
        let targets: BTreeMap<RecordKey, RecordKey> = [
            (RecordKey::from("1"), RecordKey::from("g1")),
            (RecordKey::from("2"), RecordKey::from("g1")),
        ]
        .into();
        let link = link(LinkKeys::ParentForeignKey { targets }, &["1", "2"]);
        let keys: Vec<_> = link.scope_keys().into_iter().collect();
        assert_eq!(keys, vec![RecordKey::from("g1")]);
    }

    #[test]
    fn test_linkage_serializes_as_jsonapi_data() {
        let record = Record::from_json("houses", json!({"id": "h1"})).unwrap();
        let one = Linkage::One(Some(ResourceIdentifier::of(&record)));
        assert_eq!(
            serde_json::to_value(&one).unwrap(),
            json!({"type": "houses", "id": "h1"})
        );
        assert_eq!(serde_json::to_value(Linkage::One(None)).unwrap(), json!(null));
        assert_eq!(serde_json::to_value(Linkage::Many(vec![])).unwrap(), json!([]));
    }

    #[test]
    fn test_descendants_walk_depth_first() {
        let mut root = PlanNode::new("authors", QuerySpec::default(), None, IncludeTree::new());
        let mut books = PlanNode::new("books", QuerySpec::default(), None, IncludeTree::new());
        books
            .children
            .push(PlanNode::new("genres", QuerySpec::default(), None, IncludeTree::new()));
        root.children.push(books);
        root.children
            .push(PlanNode::new("houses", QuerySpec::default(), None, IncludeTree::new()));

        let order: Vec<&str> = root.descendants().iter().map(|n| n.resource.as_str()).collect();
        assert_eq!(order, vec!["books", "genres", "houses"]);
    }
}
