//! Optimistic-concurrency conflict resolution.
//!
//! The retry policy never replays a conflicting write. Callers that want
//! "re-fetch, reapply, retry once" use [`update_with_refetch`], which rebuilds
//! the write from the latest payload and revision before trying again.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::executor::ResilientExecutor;
use crate::client::outcome::{FailureKind, Outcome};
use crate::client::request::ApiRequest;

/// Fetch the current state of a resource, derive a write from it and run it.
///
/// `fetch` always bypasses the cache. `apply` receives the fetched payload and
/// revision and returns the write to perform. On `Conflict` the resource is
/// fetched again and the rebuilt write is attempted exactly once more.
pub async fn update_with_refetch<F>(
    executor: &ResilientExecutor,
    fetch: ApiRequest,
    mut apply: F,
    cancel: &CancellationToken,
) -> Outcome
where
    F: FnMut(&Value, Option<&str>) -> ApiRequest,
{
    let fetch = fetch.no_cache();

    let mut retried = false;
    loop {
        let latest = match executor.run_with_cancel(fetch.clone(), cancel).await {
            Outcome::Success(latest) => latest,
            failure => return failure,
        };

        let write = apply(&latest.payload, latest.revision.as_deref());
        let outcome = executor.run_with_cancel(write, cancel).await;
        if retried || outcome.failure_kind() != Some(FailureKind::Conflict) {
            return outcome;
        }
        tracing::info!(resource = %fetch.resource, "Write conflicted, re-fetching latest revision");
        retried = true;
    }
}
