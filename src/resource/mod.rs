//! Resource abstraction layer
//!
//! Resource types and the relationships between them form the graph that
//! include trees are resolved against.
//!
//! # Architecture
//!
//! - [`registry`] - Immutable catalog built once through [`RegistryBuilder`]
//! - [`relationship`] - Edge descriptors, scope providers and discriminators
//! - [`schema`] - Declarative YAML/JSON definitions feeding the builder
//!
//! # Example
//!
//! ```ignore
//! use sideload::resource::{Registry, ResourceDef, Relationship};
//!
//! let mut builder = Registry::builder();
//! builder
//!     .register_resource(ResourceDef::new("authors").attributes(["name"]))?
//!     .register_resource(ResourceDef::new("books").attributes(["title"]))?
//!     .register_relationship("authors", "books", Relationship::has_many("books", "author_id"))?;
//! let registry = builder.build()?;
//! ```

mod registry;
mod relationship;
pub mod schema;

pub use registry::*;
pub use relationship::*;
pub use schema::{load_schema, parse_schema};
