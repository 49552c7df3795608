//! Request fingerprints.

use std::collections::BTreeMap;
use std::fmt;

/// Deterministic cache key derived from (operation, resource, params).
///
/// The resource identifier is kept alongside the fingerprint so invalidating a
/// resource can find every key derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    fingerprint: String,
    resource: String,
}

impl CacheKey {
    /// Params are serialized in sorted order and form-encoded, so equal inputs
    /// always produce equal fingerprints. Operation and resource are length
    /// prefixed, so distinct inputs never share one.
    pub fn new(operation: &str, resource: &str, params: &BTreeMap<String, String>) -> Self {
        let mut fingerprint = format!(
            "{}:{operation}|{}:{resource}",
            operation.len(),
            resource.len()
        );
        if !params.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish();
            fingerprint.push('?');
            fingerprint.push_str(&query);
        }
        Self {
            fingerprint,
            resource: resource.to_string(),
        }
    }

    /// Key for a bare resource with no operation or params.
    pub fn for_resource(resource: &str) -> Self {
        Self::new("", resource, &BTreeMap::new())
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("fields".to_string(), "title,state".to_string());
        a.insert("asOf".to_string(), "2024-01-01".to_string());
        let mut b = BTreeMap::new();
        b.insert("asOf".to_string(), "2024-01-01".to_string());
        b.insert("fields".to_string(), "title,state".to_string());

        let ka = CacheKey::new("GET workitems/1", "workitem:1", &a);
        let kb = CacheKey::new("GET workitems/1", "workitem:1", &b);
        assert_eq!(ka, kb);
        assert_eq!(
            ka.fingerprint(),
            "15:GET workitems/1|10:workitem:1?asOf=2024-01-01&fields=title%2Cstate"
        );
    }

    #[test]
    fn test_bare_resource_key() {
        let key = CacheKey::for_resource("item:42");
        assert_eq!(key.to_string(), "0:|7:item:42");
        assert_eq!(key.resource(), "item:42");
    }

    #[test]
    fn test_query_in_resource_does_not_alias_params() {
        let mut params = BTreeMap::new();
        params.insert("y".to_string(), "1".to_string());
        let with_params = CacheKey::new("GET items", "a", &params);
        let odd_resource = CacheKey::new("GET items", "a?y=1", &BTreeMap::new());
        assert_ne!(with_params.fingerprint(), odd_resource.fingerprint());

        let split_early = CacheKey::new("GET a|b", "c", &BTreeMap::new());
        let split_late = CacheKey::new("GET a", "b|c", &BTreeMap::new());
        assert_ne!(split_early.fingerprint(), split_late.fingerprint());
    }
}
