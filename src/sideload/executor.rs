//! Query Executor
//!
//! Turns a plan node into adapter calls: base scope, scope constraints,
//! then filter, order and paginate, then resolve. Each of the three query
//! steps can be replaced for one request through [`Overrides`].

use super::node::PlanNode;
use crate::error::{Result, SideloadError};
use crate::query::{Page, QuerySpec};
use crate::resource::Registry;
use crate::storage::{KeySet, Record, StorageAdapter};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Query step that can be overridden per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryStep {
    Filter,
    Sort,
    Paginate,
}

/// What a step sees about the fetch in progress
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    pub resource: &'a str,
    pub spec: &'a QuerySpec,
    pub page: Option<Page>,
}

/// Replacement for one query step
pub trait ScopeStep<A: StorageAdapter>: Send + Sync {
    fn apply(&self, adapter: &A, scope: A::Scope, input: &StepInput<'_>) -> A::Scope;
}

impl<A, F> ScopeStep<A> for F
where
    A: StorageAdapter,
    F: Fn(&A, A::Scope, &StepInput<'_>) -> A::Scope + Send + Sync,
{
    fn apply(&self, adapter: &A, scope: A::Scope, input: &StepInput<'_>) -> A::Scope {
        self(adapter, scope, input)
    }
}

struct NamedStep<A: StorageAdapter> {
    name: String,
    step: Arc<dyn ScopeStep<A>>,
}

impl<A: StorageAdapter> Clone for NamedStep<A> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            step: Arc::clone(&self.step),
        }
    }
}

/// Per-request replacements for the default query steps
pub struct Overrides<A: StorageAdapter> {
    steps: BTreeMap<QueryStep, NamedStep<A>>,
}

impl<A: StorageAdapter> Overrides<A> {
    pub fn new() -> Self {
        Self {
            steps: BTreeMap::new(),
        }
    }

    /// Use `step` instead of the default for this request
    pub fn with<F>(mut self, which: QueryStep, name: &str, step: F) -> Self
    where
        F: Fn(&A, A::Scope, &StepInput<'_>) -> A::Scope + Send + Sync + 'static,
    {
        self.steps.insert(
            which,
            NamedStep {
                name: name.to_string(),
                step: Arc::new(step),
            },
        );
        self
    }

    pub fn name_of(&self, which: QueryStep) -> Option<&str> {
        self.steps.get(&which).map(|s| s.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<A: StorageAdapter> Default for Overrides<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: StorageAdapter> Clone for Overrides<A> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
        }
    }
}

impl<A: StorageAdapter> fmt::Debug for Overrides<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.steps.iter().map(|(k, v)| (k, &v.name)))
            .finish()
    }
}

/// Issues the logical query sequence for plan nodes
pub struct Executor<'a, A: StorageAdapter> {
    registry: &'a Registry,
    adapter: &'a A,
    overrides: &'a Overrides<A>,
}

impl<'a, A: StorageAdapter> Executor<'a, A> {
    pub fn new(registry: &'a Registry, adapter: &'a A, overrides: &'a Overrides<A>) -> Self {
        Self {
            registry,
            adapter,
            overrides,
        }
    }

    /// Fetch a node's records. `base` replaces the adapter's base scope for
    /// the root node. An empty key set never reaches the adapter.
    pub async fn fetch(&self, node: &PlanNode, base: Option<A::Scope>) -> Result<Vec<Record>> {
        let keys = node.link.as_ref().map(|link| link.scope_keys());
        if keys.as_ref().is_some_and(KeySet::is_empty) {
            tracing::debug!("{}: no parent keys, skipping fetch", node.resource);
            return Ok(Vec::new());
        }

        let scope = self.scope_for(node, base, keys.as_ref())?;
        self.execute(&node.resource, scope, &node.spec, node.page).await
    }

    /// Base scope narrowed by the resource's base provider and the link's
    /// scope provider
    pub fn scope_for(
        &self,
        node: &PlanNode,
        base: Option<A::Scope>,
        keys: Option<&KeySet>,
    ) -> Result<A::Scope> {
        let def = self.registry.require(&node.resource)?;
        let mut scope = base.unwrap_or_else(|| self.adapter.base_scope(&node.resource));
        let empty = KeySet::new();

        if let Some(provider) = &def.base_scope {
            for constraint in provider.constraints(&empty) {
                scope = self.adapter.filter(scope, &constraint.field, &constraint.values);
            }
        }

        if let (Some(link), Some(keys)) = (&node.link, keys) {
            match &link.group {
                Some(group) => tracing::debug!(
                    "{}: scope {} over {} key(s) for group {}",
                    node.resource,
                    link.scope.name(),
                    keys.len(),
                    group
                ),
                None => tracing::debug!(
                    "{}: scope {} over {} key(s)",
                    node.resource,
                    link.scope.name(),
                    keys.len()
                ),
            }
            for constraint in link.scope.constraints(keys) {
                scope = self.adapter.filter(scope, &constraint.field, &constraint.values);
            }
        }

        Ok(scope)
    }

    /// filter -> order -> paginate -> resolve
    pub async fn execute(
        &self,
        resource: &str,
        scope: A::Scope,
        spec: &QuerySpec,
        page: Option<Page>,
    ) -> Result<Vec<Record>> {
        let input = StepInput {
            resource,
            spec,
            page,
        };

        let scope = self.step(QueryStep::Filter, scope, &input, default_filter);
        let scope = self.step(QueryStep::Sort, scope, &input, default_sort);
        let scope = self.step(QueryStep::Paginate, scope, &input, default_paginate);

        tracing::debug!("{}: resolving {:?}", resource, scope);
        let records = self.adapter.resolve(scope).await.map_err(|source| {
            tracing::error!("{}: adapter failed: {}", resource, source);
            SideloadError::Execution {
                resource: resource.to_string(),
                source,
            }
        })?;

        tracing::debug!("{}: {} record(s)", resource, records.len());
        Ok(records)
    }

    fn step(
        &self,
        which: QueryStep,
        scope: A::Scope,
        input: &StepInput<'_>,
        default: fn(&A, A::Scope, &StepInput<'_>) -> A::Scope,
    ) -> A::Scope {
        if self.overrides.is_empty() {
            return default(self.adapter, scope, input);
        }

        match self.overrides.steps.get(&which) {
            Some(named) => {
                tracing::debug!(
                    "{}: {:?} step overridden by {}",
                    input.resource,
                    which,
                    named.name
                );
                named.step.apply(self.adapter, scope, input)
            }
            None => default(self.adapter, scope, input),
        }
    }
}

fn default_filter<A: StorageAdapter>(adapter: &A, scope: A::Scope, input: &StepInput<'_>) -> A::Scope {
    input
        .spec
        .filters
        .iter()
        .fold(scope, |scope, (field, values)| adapter.filter(scope, field, values))
}

fn default_sort<A: StorageAdapter>(adapter: &A, scope: A::Scope, input: &StepInput<'_>) -> A::Scope {
    input
        .spec
        .sort
        .iter()
        .fold(scope, |scope, key| adapter.order(scope, &key.field, key.direction))
}

fn default_paginate<A: StorageAdapter>(
    adapter: &A,
    scope: A::Scope,
    input: &StepInput<'_>,
) -> A::Scope {
    match input.page {
        Some(page) => adapter.paginate(scope, page.number, page.size),
        None => scope,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{IncludeTree, SortKey};
    use crate::resource::{ResourceDef, ScopeProvider};
    use crate::storage::{Constraint, MemoryAdapter};
    use serde_json::json;

    fn registry() -> Registry {
        let mut builder = Registry::builder();
        builder
            .register_resource(
                ResourceDef::new("books")
                    .attributes(["title"])
                    .base_scope(ScopeProvider::constant(
                        "published_only",
                        vec![Constraint::new("published", ["true"])],
                    )),
            )
            .unwrap();
        builder.build().unwrap()
    }

    fn adapter() -> MemoryAdapter {
        MemoryAdapter::new()
            .with_table(
                "books",
                vec![
                    json!({"id": 1, "title": "A", "published": true}),
                    json!({"id": 2, "title": "B", "published": true}),
                    json!({"id": 3, "title": "C", "published": false}),
                    json!({"id": 4, "title": "D", "published": true}),
                ],
            )
            .unwrap()
    }

    fn node(spec: QuerySpec, page: Option<Page>) -> PlanNode {
        PlanNode::new("books", spec, page, IncludeTree::new())
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_base_scope_provider_always_applies() {
        let registry = registry();
        let adapter = adapter();
        let overrides = Overrides::new();
        let executor = Executor::new(&registry, &adapter, &overrides);

        let records = executor.fetch(&node(QuerySpec::default(), None), None).await.unwrap();
        assert_eq!(ids(&records), vec!["1", "2", "4"]);
    }

    #[tokio::test]
    async fn test_sort_then_paginate() {
        let registry = registry();
        let adapter = adapter();
        let overrides = Overrides::new();
        let executor = Executor::new(&registry, &adapter, &overrides);

        let spec = QuerySpec {
            sort: vec![SortKey::desc("id")],
            ..Default::default()
        };
        let records = executor
            .fetch(&node(spec, Some(Page::new(1, 2))), None)
            .await
            .unwrap();
        assert_eq!(ids(&records), vec!["4", "2"]);
    }

    #[tokio::test]
    async fn test_paginate_override_replaces_default() {
        let registry = registry();
        let adapter = adapter();
        let overrides = Overrides::<MemoryAdapter>::new().with(
            QueryStep::Paginate,
            "unpaginated",
            |_: &MemoryAdapter, scope, _: &StepInput<'_>| scope,
        );
        assert_eq!(overrides.name_of(QueryStep::Paginate), Some("unpaginated"));
        assert!(!overrides.is_empty());
        assert!(Overrides::<MemoryAdapter>::default().is_empty());

        let executor = Executor::new(&registry, &adapter, &overrides);
        let records = executor
            .fetch(&node(QuerySpec::default(), Some(Page::new(1, 1))), None)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_adapter_failure_becomes_execution_error() {
        let registry = registry();
        let adapter = adapter().fail_on("books");
        let overrides = Overrides::new();
        let executor = Executor::new(&registry, &adapter, &overrides);

        let err = executor
            .fetch(&node(QuerySpec::default(), None), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SideloadError::Execution { resource, .. } if resource == "books"));
    }

    #[tokio::test]
    async fn test_explicit_base_scope_is_narrowed_further() {
        let registry = registry();
        let adapter = adapter();
        let overrides = Overrides::new();
        let executor = Executor::new(&registry, &adapter, &overrides);

        let titles = vec!["A".to_string(), "C".to_string()];
        let base = adapter.filter(adapter.base_scope("books"), "title", &titles);
        let records = executor
            .fetch(&node(QuerySpec::default(), None), Some(base))
            .await
            .unwrap();
        assert_eq!(ids(&records), vec!["1"]);
    }
}
