//! Resource Registry
//!
//! Catalog of resource types, their attributes, allowed filters and
//! relationships. Built once through [`RegistryBuilder`] and read-only after
//! that; it can be installed as the process-wide registry.

use super::relationship::{KeyDirection, Relationship};
use super::ScopeProvider;
use crate::error::{ConfigError, SideloadError};
use crate::query::{Page, SortKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

/// Registry-level pagination defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageDefaults {
    pub size: u32,
    pub max_size: u32,
    /// Paginate sideloaded types that carry no explicit page parameters
    pub paginate_sideloads: bool,
}

impl Default for PageDefaults {
    fn default() -> Self {
        Self {
            size: 20,
            max_size: 1000,
            paginate_sideloads: false,
        }
    }
}

impl PageDefaults {
    pub fn first_page(&self) -> Page {
        Page::new(1, self.size)
    }
}

/// One registered resource type
#[derive(Debug, Clone)]
pub struct ResourceDef {
    pub name: String,
    /// Serialized by default
    pub attributes: Vec<String>,
    /// Serialized only when requested through `extra_fields`
    pub extra_attributes: Vec<String>,
    pub allowed_filters: BTreeSet<String>,
    pub default_sort: Vec<SortKey>,
    pub base_scope: Option<ScopeProvider>,
    relationships: BTreeMap<String, Relationship>,
}

impl ResourceDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            extra_attributes: Vec::new(),
            allowed_filters: BTreeSet::new(),
            default_sort: Vec::new(),
            base_scope: None,
            relationships: BTreeMap::new(),
        }
    }

    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn extra_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_attributes.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn allow_filters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_filters.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn default_sort(mut self, keys: Vec<SortKey>) -> Self {
        self.default_sort = keys;
        self
    }

    pub fn base_scope(mut self, provider: ScopeProvider) -> Self {
        self.base_scope = Some(provider);
        self
    }

    pub fn allows_filter(&self, name: &str) -> bool {
        self.allowed_filters.contains(name)
    }

    /// Known as either a default or an extra attribute
    pub fn declares_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name) || self.extra_attributes.iter().any(|a| a == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    pub fn relationships(&self) -> impl Iterator<Item = (&str, &Relationship)> {
        self.relationships.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Immutable resource catalog
#[derive(Debug, Clone)]
pub struct Registry {
    resources: HashMap<String, ResourceDef>,
    page_defaults: PageDefaults,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceDef> {
        self.resources.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&ResourceDef, SideloadError> {
        self.resource(name)
            .ok_or_else(|| SideloadError::UnknownResource(name.to_string()))
    }

    pub fn relationship(&self, owner: &str, name: &str) -> Result<&Relationship, SideloadError> {
        self.require(owner)?
            .relationship(name)
            .ok_or_else(|| SideloadError::UnknownRelationship {
                resource: owner.to_string(),
                name: name.to_string(),
            })
    }

    pub fn page_defaults(&self) -> PageDefaults {
        self.page_defaults
    }

    /// All resource names, sorted
    pub fn resource_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Additive registration; targets may be forward references until `build`
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    resources: HashMap<String, ResourceDef>,
    page_defaults: PageDefaults,
}

impl RegistryBuilder {
    pub fn page_defaults(&mut self, defaults: PageDefaults) -> &mut Self {
        self.page_defaults = defaults;
        self
    }

    pub fn current_page_defaults(&self) -> PageDefaults {
        self.page_defaults
    }

    pub fn register_resource(&mut self, def: ResourceDef) -> Result<&mut Self, ConfigError> {
        if self.resources.contains_key(&def.name) {
            return Err(ConfigError::DuplicateResource(def.name));
        }
        tracing::debug!("registered resource {}", def.name);
        self.resources.insert(def.name.clone(), def);
        Ok(self)
    }

    pub fn register_relationship(
        &mut self,
        owner: &str,
        name: &str,
        relationship: Relationship,
    ) -> Result<&mut Self, ConfigError> {
        let Some(def) = self.resources.get_mut(owner) else {
            return Err(ConfigError::UnknownOwner {
                owner: owner.to_string(),
                name: name.to_string(),
            });
        };

        if def.relationships.contains_key(name) {
            return Err(ConfigError::DuplicateRelationship {
                owner: owner.to_string(),
                name: name.to_string(),
            });
        }

        match &relationship {
            Relationship::PolymorphicToOne(poly) if poly.groups.is_empty() => {
                return Err(ConfigError::EmptyPolymorphicGroups {
                    owner: owner.to_string(),
                    name: name.to_string(),
                });
            }
            Relationship::ToMany(assoc) if assoc.direction == KeyDirection::OnParent => {
                return Err(ConfigError::InvalidKeyDirection {
                    owner: owner.to_string(),
                    name: name.to_string(),
                });
            }
            _ => {}
        }

        tracing::debug!("registered relationship {}.{} ({:?})", owner, name, relationship.kind());
        def.relationships.insert(name.to_string(), relationship);
        Ok(self)
    }

    /// Resolve every forward reference and freeze the catalog
    pub fn build(self) -> Result<Registry, ConfigError> {
        for def in self.resources.values() {
            for (name, relationship) in def.relationships() {
                for target in relationship.referenced_types() {
                    if !self.resources.contains_key(target) {
                        return Err(ConfigError::UnknownTarget {
                            owner: def.name.clone(),
                            name: name.to_string(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }

        Ok(Registry {
            resources: self.resources,
            page_defaults: self.page_defaults,
        })
    }
}

/// Process-wide registry
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Install the process-wide registry; only the first call succeeds
pub fn install_registry(registry: Registry) -> Result<&'static Registry, ConfigError> {
    REGISTRY
        .set(registry)
        .map_err(|_| ConfigError::AlreadyInstalled)?;
    REGISTRY.get().ok_or(ConfigError::AlreadyInstalled)
}

/// Get the process-wide registry, if one was installed
pub fn get_registry() -> Option<&'static Registry> {
    REGISTRY.get()
}
