//! Query Parameter Resolver
//!
//! Turns raw per-type parameter bundles into validated [`QuerySpecs`].
//! Validation happens up front: an unknown type, a filter outside the
//! type's allowed set or a malformed page fails the whole request before
//! anything is fetched.

use super::spec::{Page, QuerySpec, QuerySpecs, SortKey};
use crate::error::{Result, SideloadError};
use crate::resource::{PageDefaults, Registry, ResourceDef};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Scalar as it arrives from a query string, YAML or JSON
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl Scalar {
    fn as_text(&self) -> String {
        match self {
            Scalar::Text(s) => s.trim().to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// A single value, a comma-delimited string or an explicit list
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    List(Vec<Scalar>),
    One(Scalar),
}

impl ParamValue {
    /// Normalized value list; comma-delimited text is split
    pub fn values(&self) -> Vec<String> {
        match self {
            ParamValue::One(Scalar::Text(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect(),
            ParamValue::One(other) => vec![other.as_text()],
            ParamValue::List(items) => items
                .iter()
                .map(Scalar::as_text)
                .filter(|v| !v.is_empty())
                .collect(),
        }
    }

    /// The value as one unsplit string, for scalar parameters
    fn single(&self) -> Option<String> {
        match self {
            ParamValue::One(scalar) => Some(scalar.as_text()),
            ParamValue::List(items) if items.len() == 1 => Some(items[0].as_text()),
            ParamValue::List(_) => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::One(Scalar::Text(value.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawPage {
    pub number: Option<ParamValue>,
    pub size: Option<ParamValue>,
}

/// Unvalidated parameters for one resource type
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawParams {
    pub filter: BTreeMap<String, ParamValue>,
    pub sort: Option<ParamValue>,
    pub page: Option<RawPage>,
    pub fields: Option<ParamValue>,
    pub extra_fields: Option<ParamValue>,
}

/// Everything a request says about query parameters
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RequestParams {
    /// Unkeyed bundle applying to the base type
    #[serde(flatten)]
    pub base: RawParams,
    /// Bundles keyed by resource type
    pub types: BTreeMap<String, RawParams>,
}

impl RequestParams {
    pub fn for_type(mut self, resource: &str, params: RawParams) -> Self {
        self.types.insert(resource.to_string(), params);
        self
    }
}

/// Resolve all bundles of a request against the registry
pub fn resolve_params(registry: &Registry, base: &str, params: &RequestParams) -> Result<QuerySpecs> {
    let base_def = registry.require(base)?;
    let defaults = registry.page_defaults();
    let mut specs = QuerySpecs::new();

    let base_params = merge_base(base, &params.base, params.types.get(base))?;
    specs.insert(base, resolve_one(base_def, &base_params, defaults)?);

    for (resource, raw) in &params.types {
        if resource == base {
            continue;
        }
        let def = registry.require(resource)?;
        specs.insert(resource, resolve_one(def, raw, defaults)?);
    }

    tracing::debug!(
        "resolved query specs for {} (+{} keyed type(s))",
        base,
        params.types.keys().filter(|t| *t != base).count()
    );
    Ok(specs)
}

/// Combine the unkeyed bundle with one keyed by the base type; any
/// parameter given on both sides is ambiguous
fn merge_base(base: &str, unkeyed: &RawParams, keyed: Option<&RawParams>) -> Result<RawParams> {
    let Some(keyed) = keyed else {
        return Ok(unkeyed.clone());
    };

    let ambiguous = |parameter: &str| SideloadError::AmbiguousParameters {
        resource: base.to_string(),
        parameter: parameter.to_string(),
    };

    if let Some(field) = unkeyed.filter.keys().find(|f| keyed.filter.contains_key(*f)) {
        return Err(ambiguous(&format!("filter[{}]", field)));
    }
    if unkeyed.sort.is_some() && keyed.sort.is_some() {
        return Err(ambiguous("sort"));
    }
    if unkeyed.page.is_some() && keyed.page.is_some() {
        return Err(ambiguous("page"));
    }
    if unkeyed.fields.is_some() && keyed.fields.is_some() {
        return Err(ambiguous("fields"));
    }
    if unkeyed.extra_fields.is_some() && keyed.extra_fields.is_some() {
        return Err(ambiguous("extra_fields"));
    }

    let mut merged = unkeyed.clone();
    merged
        .filter
        .extend(keyed.filter.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.sort = merged.sort.or_else(|| keyed.sort.clone());
    merged.page = merged.page.or_else(|| keyed.page.clone());
    merged.fields = merged.fields.or_else(|| keyed.fields.clone());
    merged.extra_fields = merged.extra_fields.or_else(|| keyed.extra_fields.clone());
    Ok(merged)
}

fn resolve_one(def: &ResourceDef, raw: &RawParams, defaults: PageDefaults) -> Result<QuerySpec> {
    let mut filters = BTreeMap::new();
    for (field, value) in &raw.filter {
        if !def.allows_filter(field) {
            return Err(SideloadError::FilterNotAllowed {
                resource: def.name.clone(),
                filter: field.clone(),
            });
        }
        filters.insert(field.clone(), value.values());
    }

    let sort = raw
        .sort
        .as_ref()
        .map(|s| SortKey::parse_list(&s.values().join(",")))
        .unwrap_or_default();

    let page = raw
        .page
        .as_ref()
        .map(|p| resolve_page(p, defaults))
        .transpose()?;

    Ok(QuerySpec {
        filters,
        sort,
        page,
        fields: raw.fields.as_ref().map(ParamValue::values),
        extra_fields: raw
            .extra_fields
            .as_ref()
            .map(ParamValue::values)
            .unwrap_or_default(),
    })
}

fn resolve_page(raw: &RawPage, defaults: PageDefaults) -> Result<Page> {
    let number = match &raw.number {
        Some(value) => parse_positive("page[number]", value)?,
        None => 1,
    };
    let size = match &raw.size {
        Some(value) => parse_positive("page[size]", value)?,
        None => defaults.size,
    };

    if size > defaults.max_size {
        return Err(SideloadError::PageSizeExceeded {
            requested: size,
            max: defaults.max_size,
        });
    }

    Ok(Page::new(number, size))
}

fn parse_positive(name: &str, value: &ParamValue) -> Result<u32> {
    let text = value
        .single()
        .ok_or_else(|| SideloadError::invalid(name, "expected a single value"))?;
    let parsed: u32 = text
        .parse()
        .map_err(|_| SideloadError::invalid(name, format!("`{}` is not a whole number", text)))?;
    if parsed == 0 {
        return Err(SideloadError::invalid(name, "must be at least 1"));
    }
    Ok(parsed)
}
