//! Sideloading pipeline
//!
//! Resolver -> Planner -> (Executor, Assembler) -> Document.
//!
//! A node is fetched, then expanded into children from its own records,
//! then its children run, then their records are attached. Sibling
//! subtrees share no mutable state and run concurrently.

pub mod assembler;
pub mod executor;
pub mod node;
pub mod planner;

pub use assembler::assemble;
pub use executor::{Executor, Overrides, QueryStep, ScopeStep, StepInput};
pub use node::{Cardinality, LinkKeys, Linkage, ParentLink, PlanNode, ResourceIdentifier};
pub use planner::Planner;

use crate::document::{render, Document};
use crate::error::Result;
use crate::query::{resolve_params, IncludeTree, QuerySpecs, RequestParams};
use crate::resource::Registry;
use crate::storage::StorageAdapter;
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;

/// Entry point for compound document requests against one adapter
pub struct Sideloader<'a, A: StorageAdapter> {
    registry: &'a Registry,
    adapter: &'a A,
    overrides: Overrides<A>,
}

impl<'a, A: StorageAdapter> Sideloader<'a, A> {
    pub fn new(registry: &'a Registry, adapter: &'a A) -> Self {
        Self {
            registry,
            adapter,
            overrides: Overrides::new(),
        }
    }

    /// Replace default query steps for requests made through this value
    pub fn with_overrides(mut self, overrides: Overrides<A>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Resolve raw parameters, then plan and execute
    pub async fn run(
        &self,
        resource: &str,
        includes: &IncludeTree,
        params: &RequestParams,
    ) -> Result<Document> {
        let specs = resolve_params(self.registry, resource, params)?;
        self.plan_and_execute(resource, None, includes, &specs).await
    }

    /// Fetch `resource` and everything `includes` names below it. `base`
    /// replaces the adapter's base scope for the root fetch.
    pub async fn plan_and_execute(
        &self,
        resource: &str,
        base: Option<A::Scope>,
        includes: &IncludeTree,
        specs: &QuerySpecs,
    ) -> Result<Document> {
        tracing::info!("sideload request: {} include {:?}", resource, includes);
        let root = self.load(resource, base, includes, specs).await?;

        let document = render(
            self.registry,
            self.adapter,
            &root,
            &specs.fields_by_type(),
            &specs.extra_fields_by_type(),
        );
        tracing::info!(
            "sideload request: {} done, {} data, {} included",
            resource,
            document.data.len(),
            document.included.len()
        );
        Ok(document)
    }

    /// Execute and assemble the plan without rendering it
    pub async fn load(
        &self,
        resource: &str,
        base: Option<A::Scope>,
        includes: &IncludeTree,
        specs: &QuerySpecs,
    ) -> Result<PlanNode> {
        let planner = Planner::new(self.registry, specs);
        let mut root = planner.root(resource, includes)?;
        self.run_node(&planner, &mut root, base).await?;
        Ok(root)
    }

    fn run_node<'s>(
        &'s self,
        planner: &'s Planner<'s>,
        node: &'s mut PlanNode,
        base: Option<A::Scope>,
    ) -> BoxFuture<'s, Result<()>> {
        async move {
            let executor = Executor::new(self.registry, self.adapter, &self.overrides);

            if let Some(lookup) = join_lookup(node) {
                lookup.records = executor.fetch(lookup, None).await?;
            }
            Planner::resolve_join(node);

            node.records = executor.fetch(node, base).await?;
            node.children = planner.expand(node)?;

            try_join_all(
                node.children
                    .iter_mut()
                    .map(|child| self.run_node(planner, child, None)),
            )
            .await?;

            assemble(node);
            Ok(())
        }
        .boxed()
    }
}

fn join_lookup(node: &mut PlanNode) -> Option<&mut PlanNode> {
    match node.link.as_mut()?.keys {
        LinkKeys::Join { ref mut lookup, .. } => Some(&mut **lookup),
        _ => None,
    }
}
