//! Schema files
//!
//! Declarative resource definitions in YAML or JSON. Loading a schema runs
//! the same registration calls as the programmatic API, so it reports the
//! same configuration errors.

use super::registry::{PageDefaults, RegistryBuilder, ResourceDef};
use super::relationship::{Association, Discriminator, KeyDirection, Relationship, ScopeProvider};
use crate::error::ConfigError;
use crate::query::{ParamValue, SortKey};
use crate::storage::Constraint;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Root structure of a schema file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    #[serde(default)]
    pub page: Option<PageDefaults>,
    pub resources: BTreeMap<String, ResourceSchema>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceSchema {
    pub attributes: Vec<String>,
    pub extra_attributes: Vec<String>,
    pub filters: Vec<String>,
    /// Sort string, e.g. `-created_at,id`
    pub default_sort: Option<String>,
    /// Constraints applied to every fetch of this type
    pub base_filter: BTreeMap<String, ParamValue>,
    pub relationships: BTreeMap<String, RelationshipSchema>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOn {
    #[default]
    Child,
    Parent,
}

impl From<KeyOn> for KeyDirection {
    fn from(value: KeyOn) -> Self {
        match value {
            KeyOn::Child => KeyDirection::OnChild,
            KeyOn::Parent => KeyDirection::OnParent,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipSchema {
    ToOne {
        target: String,
        foreign_key: String,
        #[serde(default)]
        key_on: KeyOn,
    },
    ToMany {
        target: String,
        foreign_key: String,
        #[serde(default)]
        key_on: KeyOn,
    },
    BelongsTo {
        target: String,
        foreign_key: String,
    },
    ManyToMany {
        target: String,
        through: String,
        owner_key: String,
        target_key: String,
    },
    PolymorphicToOne {
        group_by: String,
        groups: BTreeMap<String, GroupSchema>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSchema {
    pub target: String,
    pub foreign_key: String,
}

impl RelationshipSchema {
    fn into_relationship(self) -> Relationship {
        match self {
            Self::ToOne {
                target,
                foreign_key,
                key_on,
            } => Relationship::ToOne(Association::new(&target, &foreign_key, key_on.into())),
            Self::ToMany {
                target,
                foreign_key,
                key_on,
            } => Relationship::ToMany(Association::new(&target, &foreign_key, key_on.into())),
            Self::BelongsTo {
                target,
                foreign_key,
            } => Relationship::belongs_to(&target, &foreign_key),
            Self::ManyToMany {
                target,
                through,
                owner_key,
                target_key,
            } => Relationship::many_to_many(&target, &through, &owner_key, &target_key),
            Self::PolymorphicToOne { group_by, groups } => Relationship::polymorphic_belongs_to(
                Discriminator::attribute(&group_by),
                groups.into_iter().map(|(group, g)| {
                    (group, Association::belongs_to(&g.target, &g.foreign_key))
                }),
            ),
        }
    }
}

impl ResourceSchema {
    fn to_def(&self, name: &str) -> ResourceDef {
        let mut def = ResourceDef::new(name)
            .attributes(self.attributes.iter().cloned())
            .extra_attributes(self.extra_attributes.iter().cloned())
            .allow_filters(self.filters.iter().cloned());

        if let Some(sort) = &self.default_sort {
            def = def.default_sort(SortKey::parse_list(sort));
        }

        if !self.base_filter.is_empty() {
            let constraints = self
                .base_filter
                .iter()
                .map(|(field, value)| Constraint::new(field, value.values()))
                .collect();
            def = def.base_scope(ScopeProvider::constant(
                &format!("{}.base_filter", name),
                constraints,
            ));
        }

        def
    }
}

impl SchemaFile {
    /// Register everything: resources first so relationships may point forward
    pub fn register(self, builder: &mut RegistryBuilder) -> Result<(), ConfigError> {
        if let Some(page) = self.page {
            builder.page_defaults(page);
        }

        for (name, resource) in &self.resources {
            builder.register_resource(resource.to_def(name))?;
        }

        for (owner, resource) in self.resources {
            for (name, relationship) in resource.relationships {
                builder.register_relationship(&owner, &name, relationship.into_relationship())?;
            }
        }

        Ok(())
    }
}

/// Parse a schema document into a registry builder
pub fn parse_schema(content: &str) -> Result<RegistryBuilder, ConfigError> {
    let schema: SchemaFile =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Schema(e.to_string()))?;

    let mut builder = RegistryBuilder::default();
    schema.register(&mut builder)?;
    Ok(builder)
}

/// Read and parse a schema file
pub fn load_schema(path: &Path) -> Result<RegistryBuilder, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Schema(format!("{}: {}", path.display(), e)))?;
    parse_schema(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::RelationshipKind;

    const SCHEMA: &str = r#"
page:
  size: 10
resources:
  authors:
    attributes: [name]
    filters: [id, name]
    default_sort: "-id"
    relationships:
      books: {kind: to_many, target: books, foreign_key: author_id}
      dwelling:
        kind: polymorphic_to_one
        group_by: dwelling_type
        groups:
          House: {target: houses, foreign_key: dwelling_id}
          Condo: {target: condos, foreign_key: dwelling_id}
  books:
    attributes: [title, pages]
    extra_attributes: [alternate_title]
    filters: [id]
    base_filter: {published: "true"}
    relationships:
      tags: {kind: many_to_many, target: tags, through: book_tags, owner_key: book_id, target_key: tag_id}
  tags:
    attributes: [name]
  book_tags:
    attributes: [book_id, tag_id]
  houses:
    attributes: [name, house_description]
  condos:
    attributes: [name, condo_description]
"#;

    #[test]
    fn test_schema_registers_all_kinds() {
        let registry = parse_schema(SCHEMA).unwrap().build().unwrap();

        let authors = registry.resource("authors").unwrap();
        assert_eq!(authors.default_sort, vec![SortKey::desc("id")]);
        assert!(authors.allows_filter("name"));
        assert_eq!(
            registry.relationship("authors", "dwelling").unwrap().kind(),
            RelationshipKind::PolymorphicToOne
        );
        assert_eq!(
            registry.relationship("books", "tags").unwrap().kind(),
            RelationshipKind::ManyToMany
        );
        assert_eq!(registry.page_defaults().size, 10);
        assert_eq!(registry.page_defaults().max_size, 1000);
    }

    #[test]
    fn test_base_filter_becomes_named_scope() {
        let registry = parse_schema(SCHEMA).unwrap().build().unwrap();
        let provider = registry.resource("books").unwrap().base_scope.clone().unwrap();
        assert_eq!(provider.name(), "books.base_filter");
        assert_eq!(
            provider.constraints(&Default::default()),
            vec![Constraint::new("published", ["true"])]
        );
    }

    #[test]
    fn test_empty_groups_reported_as_config_error() {
        let err = parse_schema(
            "resources:\n  authors:\n    relationships:\n      dwelling: {kind: polymorphic_to_one, group_by: t, groups: {}}\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPolymorphicGroups { .. }));
    }

    #[test]
    fn test_unknown_kind_is_schema_error() {
        let err = parse_schema(
            "resources:\n  authors:\n    relationships:\n      x: {kind: sideways, target: a}\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Schema(_)));
    }

    #[test]
    fn test_missing_target_fails_at_build() {
        let builder = parse_schema(
            "resources:\n  authors:\n    relationships:\n      books: {kind: to_many, target: books, foreign_key: author_id}\n",
        )
        .unwrap();
        assert!(matches!(
            builder.build(),
            Err(ConfigError::UnknownTarget { .. })
        ));
    }
}
