//! Relationship Descriptors
//!
//! One edge of the resource graph: its kind, key mapping, target(s) and the
//! scope provider used to constrain the child fetch.

use crate::storage::{Constraint, KeySet, Record};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Discriminator value selecting a polymorphic target
pub type GroupKey = String;

type ScopeFn = dyn Fn(&KeySet) -> Vec<Constraint> + Send + Sync;
type DiscriminatorFn = dyn Fn(&Record) -> Option<GroupKey> + Send + Sync;

/// Named, pure function from a key set to the constraints of a fetch
#[derive(Clone)]
pub struct ScopeProvider {
    name: String,
    build: Arc<ScopeFn>,
}

impl ScopeProvider {
    pub fn new<F>(name: &str, build: F) -> Self
    where
        F: Fn(&KeySet) -> Vec<Constraint> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            build: Arc::new(build),
        }
    }

    /// `field IN keys`
    pub fn match_keys(field: &str) -> Self {
        let owned = field.to_string();
        Self::new(&format!("match_keys({})", field), move |keys| {
            vec![Constraint::any_of(&owned, keys)]
        })
    }

    /// Fixed constraints that ignore the key set (resource base scopes)
    pub fn constant(name: &str, constraints: Vec<Constraint>) -> Self {
        Self::new(name, move |_| constraints.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constraints(&self, keys: &KeySet) -> Vec<Constraint> {
        (self.build)(keys)
    }
}

impl fmt::Debug for ScopeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopeProvider").field(&self.name).finish()
    }
}

/// Named, pure function from a record to its polymorphic group
#[derive(Clone)]
pub struct Discriminator {
    name: String,
    discriminate: Arc<DiscriminatorFn>,
}

impl Discriminator {
    pub fn new<F>(name: &str, discriminate: F) -> Self
    where
        F: Fn(&Record) -> Option<GroupKey> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            discriminate: Arc::new(discriminate),
        }
    }

    /// Group by the value of one attribute
    pub fn attribute(field: &str) -> Self {
        let owned = field.to_string();
        Self::new(field, move |record| {
            record.key(&owned).map(|k| k.as_str().to_string())
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn discriminate(&self, record: &Record) -> Option<GroupKey> {
        (self.discriminate)(record)
    }
}

impl fmt::Debug for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Discriminator").field(&self.name).finish()
    }
}

/// Which side of the edge stores the foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    /// `child.foreign_key == parent.id`
    OnChild,
    /// `parent.foreign_key == child.id`
    OnParent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    ToOne,
    ToMany,
    ManyToMany,
    PolymorphicToOne,
}

/// Foreign-key edge to a single target type
#[derive(Debug, Clone)]
pub struct Association {
    pub target: String,
    pub foreign_key: String,
    pub direction: KeyDirection,
    pub scope: ScopeProvider,
}

impl Association {
    pub fn new(target: &str, foreign_key: &str, direction: KeyDirection) -> Self {
        let scope = match direction {
            KeyDirection::OnChild => ScopeProvider::match_keys(foreign_key),
            KeyDirection::OnParent => ScopeProvider::match_keys("id"),
        };
        Self {
            target: target.to_string(),
            foreign_key: foreign_key.to_string(),
            direction,
            scope,
        }
    }

    /// Foreign key held by the parent (polymorphic groups use this)
    pub fn belongs_to(target: &str, foreign_key: &str) -> Self {
        Self::new(target, foreign_key, KeyDirection::OnParent)
    }

    pub fn with_scope(mut self, scope: ScopeProvider) -> Self {
        self.scope = scope;
        self
    }
}

/// Edge through a join resource
#[derive(Debug, Clone)]
pub struct JoinAssociation {
    pub target: String,
    /// Join resource holding `(owner_key, target_key)` rows
    pub through: String,
    pub owner_key: String,
    pub target_key: String,
    pub scope: ScopeProvider,
}

#[derive(Debug, Clone)]
pub struct PolymorphicAssociation {
    pub discriminator: Discriminator,
    pub groups: BTreeMap<GroupKey, Association>,
}

#[derive(Debug, Clone)]
pub enum Relationship {
    ToOne(Association),
    ToMany(Association),
    ManyToMany(JoinAssociation),
    PolymorphicToOne(PolymorphicAssociation),
}

impl Relationship {
    /// Children hold `foreign_key` pointing at the parent
    pub fn has_many(target: &str, foreign_key: &str) -> Self {
        Self::ToMany(Association::new(target, foreign_key, KeyDirection::OnChild))
    }

    pub fn has_one(target: &str, foreign_key: &str) -> Self {
        Self::ToOne(Association::new(target, foreign_key, KeyDirection::OnChild))
    }

    /// Parent holds `foreign_key` pointing at the child
    pub fn belongs_to(target: &str, foreign_key: &str) -> Self {
        Self::ToOne(Association::belongs_to(target, foreign_key))
    }

    pub fn many_to_many(target: &str, through: &str, owner_key: &str, target_key: &str) -> Self {
        Self::ManyToMany(JoinAssociation {
            target: target.to_string(),
            through: through.to_string(),
            owner_key: owner_key.to_string(),
            target_key: target_key.to_string(),
            scope: ScopeProvider::match_keys("id"),
        })
    }

    pub fn polymorphic_belongs_to(
        discriminator: Discriminator,
        groups: impl IntoIterator<Item = (GroupKey, Association)>,
    ) -> Self {
        Self::PolymorphicToOne(PolymorphicAssociation {
            discriminator,
            groups: groups.into_iter().collect(),
        })
    }

    /// Replace the scope provider of a single-target edge
    pub fn with_scope(self, scope: ScopeProvider) -> Self {
        match self {
            Self::ToOne(assoc) => Self::ToOne(assoc.with_scope(scope)),
            Self::ToMany(assoc) => Self::ToMany(assoc.with_scope(scope)),
            Self::ManyToMany(join) => Self::ManyToMany(JoinAssociation { scope, ..join }),
            poly @ Self::PolymorphicToOne(_) => poly,
        }
    }

    pub fn kind(&self) -> RelationshipKind {
        match self {
            Self::ToOne(_) => RelationshipKind::ToOne,
            Self::ToMany(_) => RelationshipKind::ToMany,
            Self::ManyToMany(_) => RelationshipKind::ManyToMany,
            Self::PolymorphicToOne(_) => RelationshipKind::PolymorphicToOne,
        }
    }

    /// Every resource type this edge can reach, join resources included
    pub fn referenced_types(&self) -> Vec<&str> {
        match self {
            Self::ToOne(assoc) | Self::ToMany(assoc) => vec![assoc.target.as_str()],
            Self::ManyToMany(join) => vec![join.target.as_str(), join.through.as_str()],
            Self::PolymorphicToOne(poly) => {
                poly.groups.values().map(|a| a.target.as_str()).collect()
            }
        }
    }

    /// Types whose relationships may appear below this edge in an include tree
    pub fn target_types(&self) -> Vec<&str> {
        match self {
            Self::ManyToMany(join) => vec![join.target.as_str()],
            other => other.referenced_types(),
        }
    }
}
