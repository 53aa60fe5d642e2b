//! Watch-fed local caches
//!
//! Every kind the operator reads is mirrored by a reflector [`Store`]. The
//! stores are only written by their reflectors; reconcilers read them and
//! never hit the API server for lookups.

use futures::future::BoxFuture;
use futures::FutureExt;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::{Selector, SelectorExt};
use kube::runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::crd::{IngressMonitor, Monitor, MonitorTemplate, Provider};
use crate::{Error, Result};

/// Read handles for all watched kinds
#[derive(Clone)]
pub struct Caches {
    pub monitors: Store<Monitor>,
    pub ingress_monitors: Store<IngressMonitor>,
    pub ingresses: Store<Ingress>,
    pub providers: Store<Provider>,
    pub templates: Store<MonitorTemplate>,
}

/// Write handles matching [`Caches`], consumed by the reflectors
pub struct Writers {
    pub monitors: Writer<Monitor>,
    pub ingress_monitors: Writer<IngressMonitor>,
    pub ingresses: Writer<Ingress>,
    pub providers: Writer<Provider>,
    pub templates: Writer<MonitorTemplate>,
}

impl Caches {
    /// Create empty caches and their writers
    pub fn new() -> (Caches, Writers) {
        let (monitors, monitors_writer) = reflector::store();
        let (ingress_monitors, ingress_monitors_writer) = reflector::store();
        let (ingresses, ingresses_writer) = reflector::store();
        let (providers, providers_writer) = reflector::store();
        let (templates, templates_writer) = reflector::store();

        (
            Caches {
                monitors,
                ingress_monitors,
                ingresses,
                providers,
                templates,
            },
            Writers {
                monitors: monitors_writer,
                ingress_monitors: ingress_monitors_writer,
                ingresses: ingresses_writer,
                providers: providers_writer,
                templates: templates_writer,
            },
        )
    }

    /// Futures resolving to `true` once the named cache holds a full listing
    fn readiness(&self) -> Vec<(&'static str, BoxFuture<'static, bool>)> {
        vec![
            ("IngressMonitor", ready(self.ingress_monitors.clone())),
            ("Monitor", ready(self.monitors.clone())),
            ("Ingress", ready(self.ingresses.clone())),
            ("Provider", ready(self.providers.clone())),
            ("MonitorTemplate", ready(self.templates.clone())),
        ]
    }
}

fn ready<K>(store: Store<K>) -> BoxFuture<'static, bool>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Eq + std::hash::Hash + Clone + Send + Sync,
{
    async move { store.wait_until_ready().await.is_ok() }.boxed()
}

/// Wait until every cache has synced, or fail once `shutdown` fires
pub async fn wait_for_cache_sync(caches: &Caches, shutdown: &CancellationToken) -> Result<()> {
    for (name, ready) in caches.readiness() {
        info!(cache = name, "Waiting for cache sync");
        let synced = tokio::select! {
            biased;
            synced = ready => synced,
            _ = shutdown.cancelled() => false,
        };

        if !synced {
            warn!(cache = name, "Could not sync cache");
            return Err(Error::CacheSyncError);
        }
        info!(cache = name, "Synced cache");
    }
    Ok(())
}

/// Work queue key of an object: `namespace/name`
pub fn key_for<K: Resource>(obj: &K) -> String {
    match obj.namespace() {
        Some(ns) if !ns.is_empty() => format!("{}/{}", ns, obj.name_any()),
        _ => obj.name_any(),
    }
}

/// Split a `namespace/name` key
pub fn split_key(key: &str) -> Result<(&str, &str)> {
    match key.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((ns, name))
        }
        _ => Err(Error::ValidationError(format!(
            "unexpected key format {:?}, expected namespace/name",
            key
        ))),
    }
}

/// Look up an object by `namespace/name` key
pub fn get_by_key<K>(store: &Store<K>, key: &str) -> Result<Option<Arc<K>>>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    let (namespace, name) = split_key(key)?;
    Ok(store.get(&ObjectRef::new(name).within(namespace)))
}

/// Look up an object by namespace and name
pub fn get<K>(store: &Store<K>, namespace: &str, name: &str) -> Option<Arc<K>>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    store.get(&ObjectRef::new(name).within(namespace))
}

/// Convert a LabelSelector into a matcher
pub fn selector_from(label_selector: &LabelSelector) -> Result<Selector> {
    Selector::try_from(label_selector.clone())
        .map_err(|e| Error::SelectorError(e.to_string()))
}

/// All cached objects in `namespace` matching `selector`, sorted by name
pub fn list_by_namespace_and_selector<K>(
    store: &Store<K>,
    namespace: &str,
    selector: &Selector,
) -> Vec<Arc<K>>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + std::hash::Hash + Clone,
{
    let mut objects: Vec<Arc<K>> = store
        .state()
        .into_iter()
        .filter(|obj| obj.namespace().as_deref() == Some(namespace))
        .filter(|obj| selector.matches(obj.labels()))
        .collect();
    objects.sort_by_key(|obj| obj.name_any());
    objects
}

/// Number of cached objects per namespace
pub fn count_by_namespace<K>(store: &Store<K>) -> BTreeMap<String, usize>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + std::hash::Hash + Clone,
{
    let mut counts = BTreeMap::new();
    for obj in store.state() {
        *counts.entry(obj.namespace().unwrap_or_default()).or_insert(0) += 1;
    }
    counts
}
