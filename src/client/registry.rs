//! Per-endpoint executor registry.
//!
//! Each configured endpoint (organization) gets its own executor, and so its
//! own rate limiter, circuit breaker and cache. Nothing is shared between
//! endpoints.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::client::executor::ResilientExecutor;
use crate::client::snapshot::MetricsSnapshot;
use crate::client::transport::{HttpTransport, Transport, TransportError};
use crate::config::{ClientConfig, EndpointConfig};

struct Registered {
    executor: Arc<ResilientExecutor>,
    /// Connection settings the transport was built from; `None` for
    /// executors inserted with a caller-supplied transport.
    source: Option<EndpointConfig>,
}

#[derive(Default)]
pub struct EndpointRegistry {
    executors: DashMap<String, Registered>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one HTTP-backed executor per configured endpoint.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let registry = Self::new();
        for endpoint in &config.endpoints {
            registry.executors.insert(endpoint.name.clone(), build(config, endpoint)?);
        }
        Ok(registry)
    }

    /// Register an executor with its own transport.
    pub fn insert(&self, executor: ResilientExecutor) -> Arc<ResilientExecutor> {
        let executor = Arc::new(executor);
        self.executors.insert(
            executor.endpoint().to_string(),
            Registered {
                executor: executor.clone(),
                source: None,
            },
        );
        executor
    }

    pub fn get(&self, name: &str) -> Option<Arc<ResilientExecutor>> {
        self.executors.get(name).map(|entry| entry.executor.clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Reconcile live executors with a reloaded config.
    ///
    /// Existing endpoints keep their limiter, breaker and cache state and only
    /// take the new parameters. An endpoint whose base URL or headers changed
    /// is rebuilt. Endpoints missing from `config` are dropped.
    ///
    /// New transports are built before anything changes, so an error leaves
    /// the registry exactly as it was.
    pub fn apply_config(&self, config: &ClientConfig) -> Result<(), TransportError> {
        let mut rebuilt = Vec::new();
        for endpoint in &config.endpoints {
            let moved = match self.executors.get(&endpoint.name) {
                None => true,
                Some(entry) => matches!(
                    &entry.source,
                    Some(old) if old.base_url != endpoint.base_url || old.headers != endpoint.headers
                ),
            };
            if moved {
                rebuilt.push((endpoint.name.clone(), build(config, endpoint)?));
            }
        }

        let wanted: HashSet<&str> = config.endpoints.iter().map(|e| e.name.as_str()).collect();
        self.executors.retain(|name, _| {
            let keep = wanted.contains(name.as_str());
            if !keep {
                tracing::info!(endpoint = %name, "Endpoint removed");
            }
            keep
        });

        for endpoint in &config.endpoints {
            if rebuilt.iter().any(|(name, _)| name == &endpoint.name) {
                continue;
            }
            if let Some(mut entry) = self.executors.get_mut(&endpoint.name) {
                entry.executor.reconfigure(config.settings_for(endpoint));
                if entry.source.is_some() {
                    entry.source = Some(endpoint.clone());
                }
            }
        }

        for (name, registered) in rebuilt {
            tracing::info!(endpoint = %name, "Endpoint (re)built");
            self.executors.insert(name, registered);
        }
        Ok(())
    }

    /// Snapshots of every endpoint, sorted by name.
    pub fn snapshots(&self) -> Vec<MetricsSnapshot> {
        let mut snapshots: Vec<MetricsSnapshot> = self
            .executors
            .iter()
            .map(|entry| entry.executor.metrics_snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        snapshots
    }

    /// Manual cache busting after an out-of-band write. Returns the number of
    /// entries removed, or `None` for an unknown endpoint.
    pub fn invalidate(&self, endpoint: &str, resource: &str) -> Option<usize> {
        self.get(endpoint).map(|executor| executor.invalidate(resource))
    }
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("endpoints", &self.names())
            .finish()
    }
}

fn build(config: &ClientConfig, endpoint: &EndpointConfig) -> Result<Registered, TransportError> {
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::from_endpoint(endpoint, &config.transport)?);
    let executor = ResilientExecutor::new(
        endpoint.name.clone(),
        transport,
        config.settings_for(endpoint),
    );
    Ok(Registered {
        executor: Arc::new(executor),
        source: Some(endpoint.clone()),
    })
}
