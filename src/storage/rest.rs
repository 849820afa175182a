//! REST storage adapter
//!
//! Resolves scopes with a GET against `<base>/<type>` using JSON:API-style
//! query parameters: `filter[field]=a,b`, `sort=a,-b`, `page[number]`,
//! `page[size]`. Accepts either a `{"data": [...]}` body or a bare array.

use super::{Record, StorageAdapter};
use crate::error::AdapterError;
use crate::query::{Direction, SortKey};
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate and strip control characters before a body reaches the log
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Query accumulated for one collection endpoint
#[derive(Debug, Clone)]
pub struct RestScope {
    pub resource: String,
    /// Field -> accepted values; filtering a field again intersects
    pub filters: BTreeMap<String, BTreeSet<String>>,
    pub sort: Vec<SortKey>,
    pub page: Option<(u32, u32)>,
}

impl RestScope {
    /// Some field has no acceptable value left, so nothing can match
    pub fn is_unsatisfiable(&self) -> bool {
        self.filters.values().any(BTreeSet::is_empty)
    }

    /// Full request URL under `base`
    pub fn url(&self, base: &Url) -> Result<Url, AdapterError> {
        let mut url = base
            .join(&urlencoding::encode(&self.resource))
            .map_err(|e| AdapterError::Unavailable(format!("bad collection url: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            for (field, values) in &self.filters {
                let joined: Vec<&str> = values.iter().map(String::as_str).collect();
                query.append_pair(&format!("filter[{}]", field), &joined.join(","));
            }
            if !self.sort.is_empty() {
                let sort: Vec<String> = self.sort.iter().map(ToString::to_string).collect();
                query.append_pair("sort", &sort.join(","));
            }
            if let Some((number, size)) = self.page {
                query.append_pair("page[number]", &number.to_string());
                query.append_pair("page[size]", &size.to_string());
            }
        }

        // Drop the dangling `?` left behind when nothing was appended
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(url)
    }
}

/// HTTP-backed adapter
#[derive(Clone)]
pub struct RestAdapter {
    client: Client,
    base_url: Url,
}

impl RestAdapter {
    pub fn new(base_url: &str) -> Result<Self, AdapterError> {
        // A trailing slash makes `join` append instead of replacing the last segment
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        let base_url = Url::parse(&normalized)
            .map_err(|e| AdapterError::Unavailable(format!("invalid endpoint {}: {}", base_url, e)))?;

        let client = Client::builder()
            .user_agent(concat!("sideload/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn fetch(&self, scope: RestScope) -> Result<Vec<Record>, AdapterError> {
        if scope.is_unsatisfiable() {
            tracing::debug!("{}: filters exclude every value, skipping request", scope.resource);
            return Ok(Vec::new());
        }

        let url = scope.url(&self.base_url)?;
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("backend error: {} - {}", status, sanitize_for_log(&body));
            return Err(AdapterError::Status {
                status: status.as_u16(),
            });
        }

        let payload: Value =
            serde_json::from_str(&body).map_err(|e| AdapterError::Decode(e.to_string()))?;
        decode_rows(&scope.resource, payload)
    }
}

impl StorageAdapter for RestAdapter {
    type Scope = RestScope;

    fn base_scope(&self, resource: &str) -> RestScope {
        RestScope {
            resource: resource.to_string(),
            filters: BTreeMap::new(),
            sort: Vec::new(),
            page: None,
        }
    }

    fn filter(&self, mut scope: RestScope, field: &str, values: &[String]) -> RestScope {
        let values: BTreeSet<String> = values.iter().cloned().collect();
        match scope.filters.get_mut(field) {
            Some(current) => current.retain(|v| values.contains(v)),
            None => {
                scope.filters.insert(field.to_string(), values);
            }
        }
        scope
    }

    fn order(&self, mut scope: RestScope, field: &str, direction: Direction) -> RestScope {
        scope.sort.push(SortKey {
            field: field.to_string(),
            direction,
        });
        scope
    }

    fn paginate(&self, mut scope: RestScope, number: u32, size: u32) -> RestScope {
        scope.page = Some((number, size));
        scope
    }

    fn resolve(
        &self,
        scope: RestScope,
    ) -> impl Future<Output = Result<Vec<Record>, AdapterError>> + Send {
        self.fetch(scope)
    }
}

/// Turn a response body into records
fn decode_rows(resource: &str, payload: Value) -> Result<Vec<Record>, AdapterError> {
    let rows = match payload {
        Value::Array(rows) => rows,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => rows,
            _ => {
                return Err(AdapterError::Decode(format!(
                    "{} response has no data array",
                    resource
                )))
            }
        },
        _ => {
            return Err(AdapterError::Decode(format!(
                "{} response is neither an array nor a document",
                resource
            )))
        }
    };

    rows.into_iter()
        .map(|row| Record::from_json(resource, flatten_resource_object(row)))
        .collect()
}

/// Lift `attributes` of a JSON:API resource object next to its `id`
fn flatten_resource_object(row: Value) -> Value {
    let Value::Object(mut map) = row else {
        return row;
    };

    let Some(Value::Object(attributes)) = map.remove("attributes") else {
        return Value::Object(map);
    };

    let mut flat = Map::new();
    if let Some(id) = map.remove("id") {
        flat.insert("id".to_string(), id);
    }
    flat.extend(attributes);
    Value::Object(flat)
}
