//! Write access to IngressMonitor resources

use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;

use crate::crd::IngressMonitor;
use crate::Result;

/// Remote store operations the reconcilers need for IngressMonitors
///
/// Reads that can be served from a cache go through the reflector stores
/// instead; this trait only covers calls that hit the API server.
#[async_trait]
pub trait IngressMonitorStore: Send + Sync {
    /// Fetch an object, `None` if it doesn't exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<IngressMonitor>>;

    /// List objects in a namespace carrying all of the given labels
    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<IngressMonitor>>;

    /// Create a new object. Status is ignored.
    async fn create(&self, im: &IngressMonitor) -> Result<IngressMonitor>;

    /// Replace metadata and spec. Fails with `Conflict` on a stale resourceVersion.
    async fn replace(&self, im: &IngressMonitor) -> Result<IngressMonitor>;

    /// Merge the given fields into the status subresource. Fields missing
    /// from `status` keep their stored value.
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<IngressMonitor>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// IngressMonitor store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeIngressMonitorStore {
    client: Client,
}

impl KubeIngressMonitorStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<IngressMonitor> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Format a label set as a selector string (`k1=v1,k2=v2`)
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

#[async_trait]
impl IngressMonitorStore for KubeIngressMonitorStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<IngressMonitor>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<IngressMonitor>> {
        let params = ListParams::default().labels(&label_selector(labels));
        let list = self.api(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create(&self, im: &IngressMonitor) -> Result<IngressMonitor> {
        let namespace = im.namespace().unwrap_or_default();
        Ok(self
            .api(&namespace)
            .create(&PostParams::default(), im)
            .await?)
    }

    async fn replace(&self, im: &IngressMonitor) -> Result<IngressMonitor> {
        let namespace = im.namespace().unwrap_or_default();
        Ok(self
            .api(&namespace)
            .replace(&im.name_any(), &PostParams::default(), im)
            .await?)
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<IngressMonitor> {
        let patch = serde_json::json!({ "status": status });
        Ok(self
            .api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
