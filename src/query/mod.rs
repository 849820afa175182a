//! Request-side query model
//!
//! - [`spec`] - Typed per-type query specs (filters, sort, page, fields)
//! - [`params`] - Raw parameter bundles and their resolution
//! - [`include`] - The nested include tree

pub mod include;
pub mod params;
pub mod spec;

pub use include::IncludeTree;
pub use params::{resolve_params, ParamValue, RawPage, RawParams, RequestParams, Scalar};
pub use spec::{Direction, FieldsByType, Page, QuerySpec, QuerySpecs, SortKey};
