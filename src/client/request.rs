//! Request description submitted to the executor.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::cache::CacheKey;

/// Whether a call mutates remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Read,
    Write,
}

/// A described operation against one remote resource.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub kind: OperationKind,
    /// Logical resource identifier used for cache invalidation (e.g. `workitem:42`).
    pub resource: String,
    pub method: Method,
    /// Path relative to the endpoint base URL.
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub body: Option<Value>,
    /// Revision the write was derived from; sent as `If-Match`.
    pub revision: Option<String>,
    pub cacheable: bool,
    /// Overrides the cache's default TTL.
    pub ttl: Option<Duration>,
    /// Rate limiter tokens consumed by this call.
    pub cost: u32,
}

impl ApiRequest {
    /// A cacheable GET.
    pub fn read(resource: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Read,
            resource: resource.into(),
            method: Method::GET,
            path: path.into(),
            params: BTreeMap::new(),
            body: None,
            revision: None,
            cacheable: true,
            ttl: None,
            cost: 1,
        }
    }

    /// A mutation; never cached.
    pub fn write(
        method: Method,
        resource: impl Into<String>,
        path: impl Into<String>,
        body: Option<Value>,
    ) -> Self {
        Self {
            kind: OperationKind::Write,
            method,
            body,
            cacheable: false,
            ..Self::read(resource, path)
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.cacheable = false;
        self
    }

    pub fn is_write(&self) -> bool {
        self.kind == OperationKind::Write
    }

    /// Cache key for this request's (operation, resource, params).
    pub fn cache_key(&self) -> CacheKey {
        let operation = format!("{} {}", self.method, self.path);
        CacheKey::new(&operation, &self.resource, &self.params)
    }
}
