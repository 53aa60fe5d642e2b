//! Shared fixtures for integration tests
//!
//! `FakeStore` keeps IngressMonitors in memory and mirrors every write into
//! the IngressMonitor cache, the way the watch stream does against a real API
//! server.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::mpsc::UnboundedSender;
use k8s_openapi::api::networking::v1::{Ingress, IngressRule, IngressSpec, IngressTLS};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::runtime::reflector::store::Writer;
use kube::runtime::watcher;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ingress_monitor_operator::adapters::ingress_monitor_store::IngressMonitorStore;
use ingress_monitor_operator::controllers::{Caches, Context, Writers};
use ingress_monitor_operator::crd::{
    HttpTemplate, IngressMonitor, LocalObjectRef, Monitor, MonitorSpec, MonitorTemplate,
    MonitorTemplateSpec, NamespacedProvider, Provider, ProviderSpec,
};
use ingress_monitor_operator::providers::{ProviderClient, ProviderRegistry};
use ingress_monitor_operator::{Error, Result};

// ============================================================================
// Fixtures
// ============================================================================

pub const NAMESPACE: &str = "testing";
pub const MONITOR_NAME: &str = "test-monitor";
pub const PROVIDER_NAME: &str = "test-provider";
pub const TEMPLATE_NAME: &str = "test-template";
pub const PROVIDER_TYPE: &str = "simple";

fn meta(name: &str, kind: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        uid: Some(format!("uid-{}-{}", kind, name)),
        ..Default::default()
    }
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Monitor selecting Ingresses by the given labels
pub fn monitor_selecting(name: &str, selector: &[(&str, &str)]) -> Monitor {
    Monitor {
        metadata: meta(name, "monitor"),
        spec: MonitorSpec {
            selector: LabelSelector {
                match_labels: Some(labels(selector)),
                match_expressions: None,
            },
            provider: LocalObjectRef {
                name: PROVIDER_NAME.to_string(),
            },
            template: LocalObjectRef {
                name: TEMPLATE_NAME.to_string(),
            },
        },
    }
}

/// The default Monitor, selecting `team=gophers`
pub fn monitor() -> Monitor {
    monitor_selecting(MONITOR_NAME, &[("team", "gophers")])
}

/// Ingress with one rule per host, terminating TLS for `tls_hosts`
pub fn ingress(
    name: &str,
    ingress_labels: &[(&str, &str)],
    hosts: &[&str],
    tls_hosts: &[&str],
) -> Ingress {
    let mut metadata = meta(name, "ingress");
    metadata.labels = Some(labels(ingress_labels));

    Ingress {
        metadata,
        spec: Some(IngressSpec {
            rules: Some(
                hosts
                    .iter()
                    .map(|host| IngressRule {
                        host: Some(host.to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            tls: Some(vec![IngressTLS {
                hosts: Some(tls_hosts.iter().map(|h| h.to_string()).collect()),
                secret_name: None,
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// `go-ingress` serving `api.example.com` over TLS
pub fn go_ingress() -> Ingress {
    ingress(
        "go-ingress",
        &[("team", "gophers"), ("squad", "operations")],
        &["api.example.com"],
        &["api.example.com"],
    )
}

pub fn template_spec() -> MonitorTemplateSpec {
    MonitorTemplateSpec {
        type_: "HTTP".to_string(),
        name: "test-{{.IngressName}}-{{.IngressNamespace}}".to_string(),
        http: Some(HttpTemplate {
            endpoint: Some("/test-healthz".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn template() -> MonitorTemplate {
    MonitorTemplate {
        metadata: meta(TEMPLATE_NAME, "template"),
        spec: template_spec(),
    }
}

pub fn provider_of_type(provider_type: &str) -> Provider {
    Provider {
        metadata: meta(PROVIDER_NAME, "provider"),
        spec: ProviderSpec {
            type_: provider_type.to_string(),
            backend_config: None,
        },
    }
}

pub fn provider() -> Provider {
    provider_of_type(PROVIDER_TYPE)
}

/// Standalone IngressMonitor with the given provider type and backend id
pub fn ingress_monitor(name: &str, provider_type: &str, id: &str) -> IngressMonitor {
    let mut spec = template_spec();
    spec.name = format!("check-{}", name);

    IngressMonitor {
        metadata: meta(name, "ingressmonitor"),
        spec: ingress_monitor_operator::crd::IngressMonitorSpec {
            provider: NamespacedProvider {
                namespace: NAMESPACE.to_string(),
                spec: ProviderSpec {
                    type_: provider_type.to_string(),
                    backend_config: None,
                },
            },
            template: spec,
        },
        status: (!id.is_empty()).then(|| ingress_monitor_operator::crd::IngressMonitorStatus {
            id: id.to_string(),
            ingress_name: String::new(),
        }),
    }
}

/// Registry returning `client` for `provider_type`
pub fn registry_with(provider_type: &str, client: Arc<dyn ProviderClient>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(
        provider_type,
        move |_: &NamespacedProvider| -> Result<Arc<dyn ProviderClient>> { Ok(client.clone()) },
    );
    registry
}

// ============================================================================
// In-memory IngressMonitor store
// ============================================================================

enum Feed {
    Cache(Mutex<Writer<IngressMonitor>>),
    Watch(UnboundedSender<watcher::Result<watcher::Event<IngressMonitor>>>),
}

pub struct FakeStore {
    objects: Mutex<BTreeMap<(String, String), IngressMonitor>>,
    version: AtomicU64,
    feed: Feed,
    creates: AtomicUsize,
    replaces: AtomicUsize,
    status_updates: AtomicUsize,
    deletes: AtomicUsize,
    fail_next_status_update: AtomicBool,
}

impl FakeStore {
    /// Store writing straight into the IngressMonitor cache
    pub fn with_cache(writer: Writer<IngressMonitor>) -> Self {
        Self::new(Feed::Cache(Mutex::new(writer)))
    }

    /// Store emitting watch events, for tests running the full operator
    pub fn with_watch(
        sender: UnboundedSender<watcher::Result<watcher::Event<IngressMonitor>>>,
    ) -> Self {
        Self::new(Feed::Watch(sender))
    }

    fn new(feed: Feed) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            version: AtomicU64::new(1),
            feed,
            creates: AtomicUsize::new(0),
            replaces: AtomicUsize::new(0),
            status_updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_next_status_update: AtomicBool::new(false),
        }
    }

    fn publish(&self, event: watcher::Event<IngressMonitor>) {
        match &self.feed {
            Feed::Cache(writer) => writer.lock().unwrap().apply_watcher_event(&event),
            Feed::Watch(sender) => {
                let _ = sender.unbounded_send(Ok(event));
            }
        }
    }

    fn next_version(&self) -> String {
        self.version.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn key(im: &IngressMonitor) -> (String, String) {
        (im.namespace().unwrap_or_default(), im.name_any())
    }

    /// Seed an object without counting it as a write
    pub fn insert(&self, mut im: IngressMonitor) -> IngressMonitor {
        im.metadata.resource_version = Some(self.next_version());
        self.objects
            .lock()
            .unwrap()
            .insert(Self::key(&im), im.clone());
        self.publish(watcher::Event::Apply(im.clone()));
        im
    }

    pub fn get_object(&self, name: &str) -> Option<IngressMonitor> {
        self.objects
            .lock()
            .unwrap()
            .get(&(NAMESPACE.to_string(), name.to_string()))
            .cloned()
    }

    pub fn objects(&self) -> Vec<IngressMonitor> {
        self.objects.lock().unwrap().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.objects().iter().map(|im| im.name_any()).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn replaces(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    pub fn status_updates(&self) -> usize {
        self.status_updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Total number of writes
    pub fn writes(&self) -> usize {
        self.creates() + self.replaces() + self.status_updates() + self.deletes()
    }

    /// Make the next status write fail with an API error
    pub fn fail_next_status_update(&self) {
        self.fail_next_status_update.store(true, Ordering::SeqCst);
    }

    /// Set `status.ingressName` the way a concurrent writer would, bumping
    /// the resourceVersion without going through the trait
    pub fn set_ingress_name(&self, name: &str, ingress_name: &str) {
        let updated = {
            let mut objects = self.objects.lock().unwrap();
            let stored = objects
                .get_mut(&(NAMESPACE.to_string(), name.to_string()))
                .expect("object to update exists");
            stored.status.get_or_insert_with(Default::default).ingress_name =
                ingress_name.to_string();
            stored.metadata.resource_version = Some(self.next_version());
            stored.clone()
        };
        self.publish(watcher::Event::Apply(updated));
    }

    fn check_version(stored: &IngressMonitor, incoming: &IngressMonitor) -> Result<()> {
        match &incoming.metadata.resource_version {
            Some(version) if stored.metadata.resource_version.as_ref() != Some(version) => {
                Err(Error::Conflict(format!(
                    "the object {} has been modified",
                    incoming.name_any()
                )))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl IngressMonitorStore for FakeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<IngressMonitor>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<IngressMonitor>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|im| im.namespace().as_deref() == Some(namespace))
            .filter(|im| labels.iter().all(|(k, v)| im.labels().get(k) == Some(v)))
            .cloned()
            .collect())
    }

    async fn create(&self, im: &IngressMonitor) -> Result<IngressMonitor> {
        let key = Self::key(im);
        let mut created = im.clone();
        created.status = None;
        created.metadata.uid = Some(format!("uid-ingressmonitor-{}", key.1));
        created.metadata.resource_version = Some(self.next_version());

        {
            let mut objects = self.objects.lock().unwrap();
            if objects.contains_key(&key) {
                return Err(Error::Conflict(format!("{} already exists", key.1)));
            }
            objects.insert(key, created.clone());
        }

        self.creates.fetch_add(1, Ordering::SeqCst);
        self.publish(watcher::Event::Apply(created.clone()));
        Ok(created)
    }

    async fn replace(&self, im: &IngressMonitor) -> Result<IngressMonitor> {
        let key = Self::key(im);
        let replaced = {
            let mut objects = self.objects.lock().unwrap();
            let stored = objects
                .get_mut(&key)
                .ok_or_else(|| Error::KubeError(format!("{} not found", key.1)))?;
            Self::check_version(stored, im)?;

            let mut replaced = im.clone();
            replaced.status = stored.status.clone();
            replaced.metadata.resource_version = Some(self.next_version());
            *stored = replaced.clone();
            replaced
        };

        self.replaces.fetch_add(1, Ordering::SeqCst);
        self.publish(watcher::Event::Apply(replaced.clone()));
        Ok(replaced)
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<IngressMonitor> {
        if self.fail_next_status_update.swap(false, Ordering::SeqCst) {
            return Err(Error::KubeError("injected status failure".to_string()));
        }

        let updated = {
            let mut objects = self.objects.lock().unwrap();
            let stored = objects
                .get_mut(&(namespace.to_string(), name.to_string()))
                .ok_or_else(|| Error::KubeError(format!("{} not found", name)))?;

            let current = stored.status.get_or_insert_with(Default::default);
            if let Some(id) = status.get("id").and_then(|v| v.as_str()) {
                current.id = id.to_string();
            }
            if let Some(ingress_name) = status.get("ingressName").and_then(|v| v.as_str()) {
                current.ingress_name = ingress_name.to_string();
            }
            stored.metadata.resource_version = Some(self.next_version());
            stored.clone()
        };

        self.status_updates.fetch_add(1, Ordering::SeqCst);
        self.publish(watcher::Event::Apply(updated.clone()));
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let removed = self
            .objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));

        if let Some(im) = removed {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.publish(watcher::Event::Delete(im));
        }
        Ok(())
    }
}

// ============================================================================
// Reconciler harness
// ============================================================================

/// Context with directly writable caches, for calling reconcilers by key
pub struct Harness {
    pub ctx: Arc<Context>,
    pub store: Arc<FakeStore>,
    monitors: Writer<Monitor>,
    ingresses: Writer<Ingress>,
    providers: Writer<Provider>,
    templates: Writer<MonitorTemplate>,
}

impl Harness {
    pub fn new(registry: ProviderRegistry) -> Self {
        let (caches, writers) = Caches::new();
        let Writers {
            monitors,
            ingress_monitors,
            ingresses,
            providers,
            templates,
        } = writers;

        let store = Arc::new(FakeStore::with_cache(ingress_monitors));
        let ctx = Context::new(store.clone(), caches, Arc::new(registry));

        Self {
            ctx,
            store,
            monitors,
            ingresses,
            providers,
            templates,
        }
    }

    /// Harness with the default Monitor, Provider and MonitorTemplate cached
    pub fn with_defaults() -> Self {
        let mut harness = Self::new(ProviderRegistry::new());
        harness.apply_monitor(monitor());
        harness.apply_provider(provider());
        harness.apply_template(template());
        harness
    }

    pub fn apply_monitor(&mut self, monitor: Monitor) {
        self.monitors
            .apply_watcher_event(&watcher::Event::Apply(monitor));
    }

    pub fn delete_monitor(&mut self, monitor: Monitor) {
        self.monitors
            .apply_watcher_event(&watcher::Event::Delete(monitor));
    }

    pub fn apply_ingress(&mut self, ingress: Ingress) {
        self.ingresses
            .apply_watcher_event(&watcher::Event::Apply(ingress));
    }

    pub fn delete_ingress(&mut self, ingress: Ingress) {
        self.ingresses
            .apply_watcher_event(&watcher::Event::Delete(ingress));
    }

    pub fn apply_provider(&mut self, provider: Provider) {
        self.providers
            .apply_watcher_event(&watcher::Event::Apply(provider));
    }

    pub fn apply_template(&mut self, template: MonitorTemplate) {
        self.templates
            .apply_watcher_event(&watcher::Event::Apply(template));
    }
}

/// Key of an object in the test namespace
pub fn key(name: &str) -> String {
    format!("{}/{}", NAMESPACE, name)
}

/// Poll `check` until it holds, panicking after a few seconds
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}
