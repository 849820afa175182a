//! sideload
//!
//! Resolves a base resource type, a nested include tree and per-type query
//! parameters into a compound document. Related records are fetched in
//! dependency order through a [`storage::StorageAdapter`], linked to their
//! parents through registered relationships, and rendered with sparse
//! fieldsets and extra fields.
//!
//! # Architecture
//!
//! - [`resource`] - Resource registry, relationship descriptors, schema files
//! - [`query`] - Raw request parameters and their typed per-type specs
//! - [`sideload`] - Planner, executor and assembler
//! - [`document`] - Compound document rendering
//! - [`storage`] - Adapter contract plus in-memory and REST backends
//! - [`config`] - Persistent user configuration

pub mod config;
pub mod document;
pub mod error;
pub mod query;
pub mod resource;
pub mod sideload;
pub mod storage;

pub use document::{Document, ResourceObject};
pub use error::{AdapterError, ConfigError, SideloadError};
pub use query::{IncludeTree, QuerySpecs, RequestParams};
pub use resource::{Registry, Relationship, ResourceDef};
pub use sideload::{Overrides, QueryStep, Sideloader};
pub use storage::{MemoryAdapter, RestAdapter, StorageAdapter};
