//! Error types
//!
//! Registration problems are [`ConfigError`]s and surface once, at startup.
//! Everything that can go wrong while serving a request is a
//! [`SideloadError`]; every variant aborts the whole request.

use thiserror::Error;

/// Failure while building or installing the resource registry
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("resource `{0}` is already registered")]
    DuplicateResource(String),

    #[error("relationship `{owner}.{name}` is already registered")]
    DuplicateRelationship { owner: String, name: String },

    #[error("cannot attach relationship `{name}` to unregistered resource `{owner}`")]
    UnknownOwner { owner: String, name: String },

    #[error("relationship `{owner}.{name}` targets unregistered resource `{target}`")]
    UnknownTarget {
        owner: String,
        name: String,
        target: String,
    },

    #[error("polymorphic relationship `{owner}.{name}` declares no groups")]
    EmptyPolymorphicGroups { owner: String, name: String },

    #[error("to_many relationship `{owner}.{name}` cannot keep its foreign key on the parent")]
    InvalidKeyDirection { owner: String, name: String },

    #[error("a registry is already installed for this process")]
    AlreadyInstalled,

    #[error("invalid schema: {0}")]
    Schema(String),
}

/// Failure reported by a storage adapter
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {status}")]
    Status { status: u16 },

    #[error("could not decode records: {0}")]
    Decode(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Failure while resolving, planning or executing one request
#[derive(Debug, Error)]
pub enum SideloadError {
    #[error("filter `{filter}` is not allowed on `{resource}`")]
    FilterNotAllowed { resource: String, filter: String },

    #[error("`{resource}` has no relationship named `{name}`")]
    UnknownRelationship { resource: String, name: String },

    #[error("`{resource}.{relationship}` has no target mapped for group `{group}`")]
    UnmappedPolymorphicGroup {
        resource: String,
        relationship: String,
        group: String,
    },

    #[error("unknown resource `{0}`")]
    UnknownResource(String),

    #[error("invalid `{name}` parameter: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("page size {requested} exceeds the maximum of {max}")]
    PageSizeExceeded { requested: u32, max: u32 },

    #[error("`{parameter}` for `{resource}` is given both keyed and unkeyed")]
    AmbiguousParameters { resource: String, parameter: String },

    #[error("fetching `{resource}` failed")]
    Execution {
        resource: String,
        #[source]
        source: AdapterError,
    },
}

impl SideloadError {
    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = SideloadError> = std::result::Result<T, E>;
