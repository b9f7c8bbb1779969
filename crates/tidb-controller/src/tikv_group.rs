//! TiKVGroup status writes with optimistic concurrency
//!
//! The updater writes a new status onto the group through the status
//! subresource, conditional on the resourceVersion it last saw. When another
//! writer got there first the API server answers 409; the updater then takes
//! the latest copy from the informer cache, puts the desired status back on
//! it and tries again within a small, fixed budget.

use std::sync::Arc;

use async_trait::async_trait;
use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Client, Resource, ResourceExt};
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use tidb_common::crd::{TiKVGroup, TiKVGroupStatus, DEFAULT_NAMESPACE};
use tidb_common::events::{EventPublisher, StatusEvent};
use tidb_common::retry::{Backoff, ConflictRetry, RetryState};
use tidb_common::{Error, FIELD_MANAGER};

/// Write access to TiKVGroup status
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TikvGroupStore: Send + Sync {
    /// Replace the status of `tg`, conditional on its resourceVersion
    ///
    /// Returns the stored object. A stale resourceVersion fails with an error
    /// for which [`Error::is_conflict`] holds.
    async fn update_status(&self, tg: &TiKVGroup) -> Result<TiKVGroup, Error>;
}

/// Read-only, possibly stale view of TiKVGroups
#[cfg_attr(test, automock)]
pub trait TikvGroupLister: Send + Sync {
    /// Look up a group by namespace and name
    fn get(&self, namespace: &str, name: &str) -> Result<Arc<TiKVGroup>, Error>;
}

/// Namespace of a group, falling back to the default namespace
pub(crate) fn group_namespace(tg: &TiKVGroup) -> String {
    tg.namespace()
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
}

/// JSON patch replacing the whole status of `tg`
///
/// Carrying the resourceVersion makes the API server reject the write with a
/// conflict if the object moved on. The status is written with `add`, which
/// replaces it wholesale, so stores and conditions dropped from the new status
/// disappear instead of being merged with the stored ones.
pub fn status_patch(tg: &TiKVGroup) -> Result<json_patch::Patch, Error> {
    let mut ops = Vec::with_capacity(2);

    if let Some(resource_version) = tg.resource_version() {
        ops.push(PatchOperation::Replace(ReplaceOperation {
            path: PointerBuf::from_tokens(["metadata", "resourceVersion"]),
            value: serde_json::Value::String(resource_version),
        }));
    }

    let status = serde_json::to_value(tg.status.clone().unwrap_or_default())
        .map_err(|e| Error::internal_with_context("status-patch", e.to_string()))?;
    ops.push(PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(["status"]),
        value: status,
    }));

    Ok(json_patch::Patch(ops))
}

/// Status store backed by the Kubernetes API
pub struct KubeTikvGroupStore {
    client: Client,
}

impl KubeTikvGroupStore {
    /// Create a new store wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TikvGroupStore for KubeTikvGroupStore {
    async fn update_status(&self, tg: &TiKVGroup) -> Result<TiKVGroup, Error> {
        let namespace = group_namespace(tg);
        let name = tg.name_any();
        let api: Api<TiKVGroup> = Api::namespaced(self.client.clone(), &namespace);

        let patch = status_patch(tg)?;
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        match api
            .patch_status(&name, &params, &Patch::Json::<()>(patch))
            .await
        {
            Ok(updated) => Ok(updated),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                Err(Error::write_conflict(namespace, name, ae.message))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Lister backed by a reflector store
#[derive(Clone)]
pub struct ReflectorTikvGroupLister {
    store: Store<TiKVGroup>,
}

impl ReflectorTikvGroupLister {
    /// Create a lister reading from `store`
    pub fn new(store: Store<TiKVGroup>) -> Self {
        Self { store }
    }
}

impl TikvGroupLister for ReflectorTikvGroupLister {
    fn get(&self, namespace: &str, name: &str) -> Result<Arc<TiKVGroup>, Error> {
        self.store
            .get(&ObjectRef::new(name).within(namespace))
            .ok_or_else(|| Error::lookup(namespace, name, "not found in informer cache"))
    }
}

/// Status writes for TiKVGroups
#[async_trait]
pub trait TikvGroupControl: Send + Sync {
    /// Write `new_status` onto `tg`, retrying on conflict
    ///
    /// `old_status` is the status the caller started from. It is only used to
    /// describe the change in logs and events.
    async fn update_tikv_group(
        &self,
        tg: &TiKVGroup,
        new_status: &TiKVGroupStatus,
        old_status: &TiKVGroupStatus,
    ) -> Result<TiKVGroup, Error>;
}

/// [`TikvGroupControl`] against a real status store and informer cache
pub struct RealTikvGroupControl {
    store: Arc<dyn TikvGroupStore>,
    lister: Arc<dyn TikvGroupLister>,
    events: Arc<dyn EventPublisher>,
    backoff: Backoff,
}

impl RealTikvGroupControl {
    /// Create a control using [`Backoff::DEFAULT_RETRY`]
    pub fn new(
        store: Arc<dyn TikvGroupStore>,
        lister: Arc<dyn TikvGroupLister>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            lister,
            events,
            backoff: Backoff::DEFAULT_RETRY,
        }
    }

    /// Replace the retry budget
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Fresh working copy after a conflict
    ///
    /// Takes identity and spec from the cache and reasserts the desired
    /// status. If the cache lookup fails the previous copy is kept.
    fn refresh(&self, namespace: &str, name: &str, new_status: &TiKVGroupStatus) -> Option<TiKVGroup> {
        match self.lister.get(namespace, name) {
            Ok(latest) => {
                let mut fresh = TiKVGroup::clone(&latest);
                fresh.status = Some(new_status.clone());
                Some(fresh)
            }
            Err(e) => {
                warn!(
                    namespace,
                    name,
                    error = %e,
                    "Failed to get latest TiKVGroup from cache, retrying with previous copy"
                );
                None
            }
        }
    }
}

fn describe_change(old_status: &TiKVGroupStatus, new_status: &TiKVGroupStatus) -> String {
    format!(
        "phase {} -> {}, synced {} -> {}, stores {} -> {}",
        old_status.phase,
        new_status.phase,
        old_status.synced,
        new_status.synced,
        old_status.stores.len(),
        new_status.stores.len()
    )
}

#[async_trait]
impl TikvGroupControl for RealTikvGroupControl {
    async fn update_tikv_group(
        &self,
        tg: &TiKVGroup,
        new_status: &TiKVGroupStatus,
        old_status: &TiKVGroupStatus,
    ) -> Result<TiKVGroup, Error> {
        let namespace = group_namespace(tg);
        let name = tg.name_any();

        let mut working = tg.clone();
        working.status = Some(new_status.clone());

        let mut retry = ConflictRetry::new(self.backoff.clone());
        loop {
            let attempt = retry.attempts();
            let err = match self.store.update_status(&working).await {
                Ok(updated) => {
                    retry.record_write(false);
                    info!(
                        namespace = %namespace,
                        name = %name,
                        attempt,
                        phase = %new_status.phase,
                        "TiKVGroup status updated"
                    );
                    self.events
                        .publish(
                            &updated.object_ref(&()),
                            StatusEvent::updated(describe_change(old_status, new_status)),
                        )
                        .await;
                    return Ok(updated);
                }
                Err(e) => e,
            };

            if !err.is_conflict() {
                warn!(
                    namespace = %namespace,
                    name = %name,
                    attempt,
                    error = %err,
                    "Failed to update TiKVGroup status"
                );
                return Err(err);
            }

            warn!(
                namespace = %namespace,
                name = %name,
                attempt,
                error = %err,
                "TiKVGroup status update conflicted"
            );

            if let RetryState::Exhausted { attempts } = retry.record_write(true) {
                let note = format!(
                    "gave up after {} conflicting attempts ({})",
                    attempts,
                    describe_change(old_status, new_status)
                );
                self.events
                    .publish(&working.object_ref(&()), StatusEvent::update_failed(note))
                    .await;
                return Err(err);
            }

            if let Some(fresh) = self.refresh(&namespace, &name, new_status) {
                working = fresh;
            }

            if let Some(delay) = retry.next_attempt() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
