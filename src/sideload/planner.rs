//! Sideload Planner
//!
//! Builds plan nodes depth-first from the base resource and the include
//! tree. Children are derived from a parent's fetched records, so a child
//! can never run before its parent:
//!
//! - to_one / to_many: one child scoped to parent ids (key on child) or to
//!   the parents' foreign key values (key on parent)
//! - many_to_many: one child whose key set comes from an auxiliary join
//!   lookup node, fetched first
//! - polymorphic_to_one: parents are partitioned by discriminator and each
//!   group present gets its own child; absent groups get no node

use super::node::{Cardinality, LinkKeys, ParentLink, PlanNode};
use crate::error::{Result, SideloadError};
use crate::query::{IncludeTree, Page, QuerySpec, QuerySpecs};
use crate::resource::{
    Association, GroupKey, JoinAssociation, KeyDirection, PolymorphicAssociation, Registry,
    Relationship, ScopeProvider,
};
use crate::storage::{KeySet, Record};
use std::collections::BTreeMap;

/// Pure plan construction for one request
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    registry: &'a Registry,
    specs: &'a QuerySpecs,
}

impl<'a> Planner<'a> {
    pub fn new(registry: &'a Registry, specs: &'a QuerySpecs) -> Self {
        Self { registry, specs }
    }

    /// Base node for `resource`; the whole include tree is checked first
    pub fn root(&self, resource: &str, includes: &IncludeTree) -> Result<PlanNode> {
        self.registry.require(resource)?;
        self.validate(resource, includes)?;

        let spec = self.spec_for(resource);
        let page = Some(
            spec.page
                .unwrap_or_else(|| self.registry.page_defaults().first_page()),
        );
        Ok(PlanNode::new(resource, spec, page, includes.clone()))
    }

    /// Reject unknown relationship names anywhere in the tree. Depth is
    /// bounded by the tree itself, so self-referential types are fine.
    fn validate(&self, resource: &str, includes: &IncludeTree) -> Result<()> {
        for (name, subtree) in includes.iter() {
            let relationship = self.registry.relationship(resource, name)?;
            if subtree.is_empty() {
                continue;
            }

            match relationship {
                Relationship::PolymorphicToOne(poly) => {
                    self.validate_polymorphic(resource, name, poly, subtree)?;
                }
                other => {
                    for target in other.target_types() {
                        self.validate(target, subtree)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Nested names must exist on at least one group target
    fn validate_polymorphic(
        &self,
        resource: &str,
        name: &str,
        poly: &PolymorphicAssociation,
        subtree: &IncludeTree,
    ) -> Result<()> {
        for (nested, _) in subtree.iter() {
            let owners: Vec<&str> = poly
                .groups
                .values()
                .map(|assoc| assoc.target.as_str())
                .filter(|target| {
                    self.registry
                        .resource(target)
                        .is_some_and(|def| def.relationship(nested).is_some())
                })
                .collect();

            if owners.is_empty() {
                return Err(SideloadError::UnknownRelationship {
                    resource: format!("{}.{}", resource, name),
                    name: nested.to_string(),
                });
            }

            let branch = subtree.retain(|n| n == nested);
            for owner in owners {
                self.validate(owner, &branch)?;
            }
        }
        Ok(())
    }

    /// Children of an executed node, one per include (or per present group)
    pub fn expand(&self, parent: &PlanNode) -> Result<Vec<PlanNode>> {
        let mut children = Vec::new();

        for (name, subtree) in parent.includes.iter() {
            let relationship = self.registry.relationship(&parent.resource, name)?;
            let parents: Vec<&Record> = parent.records.iter().collect();

            match relationship {
                Relationship::ToOne(assoc) => children.push(self.associated(
                    name,
                    assoc,
                    Cardinality::One,
                    &parents,
                    None,
                    subtree.clone(),
                )),
                Relationship::ToMany(assoc) => children.push(self.associated(
                    name,
                    assoc,
                    Cardinality::Many,
                    &parents,
                    None,
                    subtree.clone(),
                )),
                Relationship::ManyToMany(join) => {
                    children.push(self.joined(name, join, parent.ids(), subtree.clone()))
                }
                Relationship::PolymorphicToOne(poly) => {
                    children.extend(self.polymorphic(parent, name, poly, subtree)?)
                }
            }
        }

        tracing::debug!(
            "expanded {} ({} records) into {} child node(s)",
            parent.resource,
            parent.records.len(),
            children.len()
        );
        Ok(children)
    }

    fn associated(
        &self,
        name: &str,
        assoc: &Association,
        cardinality: Cardinality,
        parents: &[&Record],
        group: Option<GroupKey>,
        includes: IncludeTree,
    ) -> PlanNode {
        let keys = match assoc.direction {
            KeyDirection::OnChild => LinkKeys::ChildForeignKey {
                foreign_key: assoc.foreign_key.clone(),
            },
            KeyDirection::OnParent => LinkKeys::ParentForeignKey {
                targets: parents
                    .iter()
                    .filter_map(|r| r.key(&assoc.foreign_key).map(|fk| (r.id.clone(), fk)))
                    .collect(),
            },
        };

        let link = ParentLink {
            relationship: name.to_string(),
            cardinality,
            group,
            parents: parents.iter().map(|r| r.id.clone()).collect(),
            keys,
            scope: assoc.scope.clone(),
        };

        self.child(&assoc.target, includes).with_link(link)
    }

    fn joined(
        &self,
        name: &str,
        join: &JoinAssociation,
        parent_ids: KeySet,
        includes: IncludeTree,
    ) -> PlanNode {
        // The lookup ignores request parameters and is never paginated
        let lookup_spec = QuerySpec {
            sort: self
                .registry
                .resource(&join.through)
                .map(|def| def.default_sort.clone())
                .unwrap_or_default(),
            ..Default::default()
        };

        let lookup = PlanNode::new(&join.through, lookup_spec, None, IncludeTree::new()).with_link(
            ParentLink {
                relationship: name.to_string(),
                cardinality: Cardinality::Many,
                group: None,
                parents: parent_ids.clone(),
                keys: LinkKeys::ChildForeignKey {
                    foreign_key: join.owner_key.clone(),
                },
                scope: ScopeProvider::match_keys(&join.owner_key),
            },
        );

        let link = ParentLink {
            relationship: name.to_string(),
            cardinality: Cardinality::Many,
            group: None,
            parents: parent_ids,
            keys: LinkKeys::Join {
                owner_key: join.owner_key.clone(),
                target_key: join.target_key.clone(),
                lookup: Box::new(lookup),
                targets: BTreeMap::new(),
            },
            scope: join.scope.clone(),
        };

        self.child(&join.target, includes).with_link(link)
    }

    fn polymorphic(
        &self,
        parent: &PlanNode,
        name: &str,
        poly: &PolymorphicAssociation,
        subtree: &IncludeTree,
    ) -> Result<Vec<PlanNode>> {
        let mut groups: BTreeMap<GroupKey, Vec<&Record>> = BTreeMap::new();
        for record in &parent.records {
            match poly.discriminator.discriminate(record) {
                Some(group) => groups.entry(group).or_default().push(record),
                None => tracing::debug!(
                    "{} {} has no {} group, leaving it unattached",
                    parent.resource,
                    record.id,
                    name
                ),
            }
        }

        let mut children = Vec::with_capacity(groups.len());
        for (group, members) in groups {
            let Some(assoc) = poly.groups.get(&group) else {
                return Err(SideloadError::UnmappedPolymorphicGroup {
                    resource: parent.resource.clone(),
                    relationship: name.to_string(),
                    group,
                });
            };

            let target = self.registry.require(&assoc.target)?;
            let includes = subtree.retain(|n| target.relationship(n).is_some());

            tracing::debug!(
                "{}.{} group {} -> {} ({} parent(s))",
                parent.resource,
                name,
                group,
                assoc.target,
                members.len()
            );
            children.push(self.associated(
                name,
                assoc,
                Cardinality::One,
                &members,
                Some(group),
                includes,
            ));
        }
        Ok(children)
    }

    /// Fill a join node's parent -> child id map from its fetched lookup
    pub fn resolve_join(node: &mut PlanNode) {
        let Some(ParentLink {
            keys:
                LinkKeys::Join {
                    owner_key,
                    target_key,
                    lookup,
                    targets,
                },
            ..
        }) = node.link.as_mut()
        else {
            return;
        };

        targets.clear();
        for row in &lookup.records {
            if let (Some(owner), Some(target)) = (row.key(owner_key), row.key(target_key)) {
                targets.entry(owner).or_default().insert(target);
            }
        }
    }

    fn child(&self, resource: &str, includes: IncludeTree) -> PlanNode {
        let spec = self.spec_for(resource);
        let page = self.sideload_page(&spec);
        PlanNode::new(resource, spec, page, includes)
    }

    /// One spec per type, wherever the type appears in the tree
    fn spec_for(&self, resource: &str) -> QuerySpec {
        let mut spec = self.specs.spec_for(resource);
        if spec.sort.is_empty() {
            if let Some(def) = self.registry.resource(resource) {
                spec.sort = def.default_sort.clone();
            }
        }
        spec
    }

    fn sideload_page(&self, spec: &QuerySpec) -> Option<Page> {
        let defaults = self.registry.page_defaults();
        spec.page
            .or_else(|| defaults.paginate_sideloads.then(|| defaults.first_page()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortKey;
    use crate::resource::{Discriminator, PageDefaults, ResourceDef};
    use crate::storage::RecordKey;
    use serde_json::json;

    fn registry(paginate_sideloads: bool) -> Registry {
        let mut builder = Registry::builder();
        builder.page_defaults(PageDefaults {
            paginate_sideloads,
            ..Default::default()
        });
        for def in [
            ResourceDef::new("authors").attributes(["name"]),
            ResourceDef::new("books")
                .attributes(["title"])
                .default_sort(vec![SortKey::desc("id")]),
            ResourceDef::new("genres").attributes(["name"]),
            ResourceDef::new("tags").attributes(["name"]),
            ResourceDef::new("book_tags").attributes(["book_id", "tag_id"]),
            ResourceDef::new("houses").attributes(["name"]),
            ResourceDef::new("condos").attributes(["name"]),
            ResourceDef::new("rooms").attributes(["name"]),
        ] {
            builder.register_resource(def).unwrap();
        }
        builder
            .register_relationship("authors", "books", Relationship::has_many("books", "author_id"))
            .unwrap()
            .register_relationship("books", "genre", Relationship::belongs_to("genres", "genre_id"))
            .unwrap()
            .register_relationship("books", "author", Relationship::belongs_to("authors", "author_id"))
            .unwrap()
            .register_relationship(
                "books",
                "tags",
                Relationship::many_to_many("tags", "book_tags", "book_id", "tag_id"),
            )
            .unwrap()
            .register_relationship("houses", "rooms", Relationship::has_many("rooms", "house_id"))
            .unwrap()
            .register_relationship(
                "authors",
                "dwelling",
                Relationship::polymorphic_belongs_to(
                    Discriminator::attribute("dwelling_type"),
                    [
                        ("House".to_string(), Association::belongs_to("houses", "dwelling_id")),
                        ("Condo".to_string(), Association::belongs_to("condos", "dwelling_id")),
                    ],
                ),
            )
            .unwrap();
        builder.build().unwrap()
    }

    fn record(resource: &str, value: serde_json::Value) -> Record {
        Record::from_json(resource, value).unwrap()
    }

    #[test]
    fn test_root_uses_default_page_and_sort() {
        let registry = registry(false);
        let specs = QuerySpecs::new();
        let root = Planner::new(&registry, &specs)
            .root("books", &IncludeTree::new())
            .unwrap();
        assert_eq!(root.page, Some(Page::new(1, 20)));
        assert_eq!(root.spec.sort, vec![SortKey::desc("id")]);
    }

    #[test]
    fn test_unknown_relationship_rejected_before_fetch() {
        let registry = registry(false);
        let specs = QuerySpecs::new();
        let err = Planner::new(&registry, &specs)
            .root("authors", &IncludeTree::parse("books.publisher"))
            .unwrap_err();
        assert!(matches!(
            err,
            SideloadError::UnknownRelationship { resource, name } if resource == "books" && name == "publisher"
        ));
    }

    #[test]
    fn test_cyclic_includes_bounded_by_tree() {
        let registry = registry(false);
        let specs = QuerySpecs::new();
        let planner = Planner::new(&registry, &specs);
        assert!(planner
            .root("authors", &IncludeTree::parse("books.author.books.author"))
            .is_ok());
    }

    #[test]
    fn test_polymorphic_nested_include_needs_one_owner() {
        let registry = registry(false);
        let specs = QuerySpecs::new();
        let planner = Planner::new(&registry, &specs);
        assert!(planner.root("authors", &IncludeTree::parse("dwelling.rooms")).is_ok());
        assert!(matches!(
            planner.root("authors", &IncludeTree::parse("dwelling.garage")),
            Err(SideloadError::UnknownRelationship { .. })
        ));
    }

    #[test]
    fn test_child_key_expansion_scopes_to_parent_ids() {
        let registry = registry(false);
        let specs = QuerySpecs::new();
        let planner = Planner::new(&registry, &specs);
        let mut root = planner.root("authors", &IncludeTree::parse("books")).unwrap();
        root.records = vec![record("authors", json!({"id": 1})), record("authors", json!({"id": 2}))];

        let children = planner.expand(&root).unwrap();
        assert_eq!(children.len(), 1);
        let link = children[0].link.as_ref().unwrap();
        assert_eq!(link.cardinality, Cardinality::Many);
        assert_eq!(link.scope_keys().len(), 2);
        assert_eq!(children[0].page, None, "sideloads are unpaginated by default");
    }

    #[test]
    fn test_sideload_pagination_follows_registry_default() {
        let registry = registry(true);
        let specs = QuerySpecs::new();
        let planner = Planner::new(&registry, &specs);
        let mut root = planner.root("authors", &IncludeTree::parse("books")).unwrap();
        root.records = vec![record("authors", json!({"id": 1}))];

        let children = planner.expand(&root).unwrap();
        assert_eq!(children[0].page, Some(Page::new(1, 20)));
    }

    #[test]
    fn test_parent_key_expansion_collects_foreign_keys() {
        let registry = registry(false);
        let specs = QuerySpecs::new();
        let planner = Planner::new(&registry, &specs);
        let mut root = planner.root("books", &IncludeTree::parse("genre")).unwrap();
        root.records = vec![
            record("books", json!({"id": 1, "genre_id": 7})),
            record("books", json!({"id": 2, "genre_id": 7})),
            record("books", json!({"id": 3, "genre_id": null})),
        ];

        let children = planner.expand(&root).unwrap();
        let link = children[0].link.as_ref().unwrap();
        assert_eq!(link.parents.len(), 3);
        assert_eq!(link.scope_keys().into_iter().collect::<Vec<_>>(), vec![RecordKey::from("7")]);
    }

    #[test]
    fn test_polymorphic_builds_node_per_present_group() {
        let registry = registry(false);
        let specs = QuerySpecs::new();
        let planner = Planner::new(&registry, &specs);
        let mut root = planner.root("authors", &IncludeTree::parse("dwelling.rooms")).unwrap();
        root.records = vec![
            record("authors", json!({"id": 1, "dwelling_type": "House", "dwelling_id": "h1"})),
            record("authors", json!({"id": 2, "dwelling_type": "House", "dwelling_id": "h2"})),
        ];

        let children = planner.expand(&root).unwrap();
        assert_eq!(children.len(), 1, "condo group is absent, so no condo node");
        assert_eq!(children[0].resource, "houses");
        assert_eq!(children[0].link.as_ref().unwrap().group.as_deref(), Some("House"));
        assert!(children[0].includes.get("rooms").is_some());
    }

    #[test]
    fn test_polymorphic_group_includes_are_filtered_per_target() {
        let registry = registry(false);
        let specs = QuerySpecs::new();
        let planner = Planner::new(&registry, &specs);
        let mut root = planner.root("authors", &IncludeTree::parse("dwelling.rooms")).unwrap();
        root.records = vec![record(
            "authors",
            json!({"id": 1, "dwelling_type": "Condo", "dwelling_id": "c1"}),
        )];

        let children = planner.expand(&root).unwrap();
        assert_eq!(children[0].resource, "condos");
        assert!(children[0].includes.is_empty());
    }

    #[test]
    fn test_unmapped_group_is_an_error() {
        let registry = registry(false);
        let specs = QuerySpecs::new();
        let planner = Planner::new(&registry, &specs);
        let mut root = planner.root("authors", &IncludeTree::parse("dwelling")).unwrap();
        root.records = vec![record(
            "authors",
            json!({"id": 1, "dwelling_type": "Boat", "dwelling_id": "b1"}),
        )];

        let err = planner.expand(&root).unwrap_err();
        assert!(matches!(
            err,
            SideloadError::UnmappedPolymorphicGroup { group, .. } if group == "Boat"
        ));
    }

    #[test]
    fn test_join_resolution_builds_target_map() {
        let registry = registry(false);
        let specs = QuerySpecs::new();
        let planner = Planner::new(&registry, &specs);
        let mut root = planner.root("books", &IncludeTree::parse("tags")).unwrap();
        root.records = vec![record("books", json!({"id": 1})), record("books", json!({"id": 2}))];

        let mut children = planner.expand(&root).unwrap();
        let tags = &mut children[0];
        if let Some(ParentLink {
            keys: LinkKeys::Join { lookup, .. },
            ..
        }) = tags.link.as_mut()
        {
            assert_eq!(lookup.resource, "book_tags");
            assert_eq!(lookup.page, None);
            lookup.records = vec![
                record("book_tags", json!({"id": 10, "book_id": 1, "tag_id": "a"})),
                record("book_tags", json!({"id": 11, "book_id": 1, "tag_id": "b"})),
                record("book_tags", json!({"id": 12, "book_id": 2, "tag_id": "a"})),
            ];
        } else {
            panic!("tags should be a join link");
        }

        Planner::resolve_join(tags);
        let link = tags.link.as_ref().unwrap();
        assert_eq!(link.scope_keys().len(), 2);
        let LinkKeys::Join { targets, .. } = &link.keys else {
            panic!("join link expected");
        };
        assert_eq!(targets[&RecordKey::from("1")].len(), 2);
    }
}
