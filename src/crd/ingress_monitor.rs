//! IngressMonitor Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{MonitorTemplateSpec, NamespacedProvider};

/// IngressMonitor resource specification
///
/// A fully resolved check for one Ingress host. It holds copies of the
/// provider and template data so it can be synced with the backend without
/// reading any other resource.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ingressmonitor.sphc.io",
    version = "v1alpha1",
    kind = "IngressMonitor",
    plural = "ingressmonitors",
    singular = "ingressmonitor",
    shortname = "im",
    namespaced,
    status = "IngressMonitorStatus",
    printcolumn = r#"{"name": "Ingress", "type": "string", "jsonPath": ".status.ingressName"}"#,
    printcolumn = r#"{"name": "URL", "type": "string", "jsonPath": ".spec.template.http.url"}"#,
    printcolumn = r#"{"name": "ID", "type": "string", "jsonPath": ".status.id"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IngressMonitorSpec {
    /// Provider the check is registered with
    pub provider: NamespacedProvider,

    /// Rendered check configuration
    pub template: MonitorTemplateSpec,
}

/// IngressMonitor status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressMonitorStatus {
    /// Identifier assigned by the provider. Empty until the check is created.
    #[serde(default)]
    pub id: String,

    /// Name of the Ingress this check was generated for
    #[serde(default)]
    pub ingress_name: String,
}

impl IngressMonitor {
    /// The provider assigned identifier, empty if never created
    pub fn backend_id(&self) -> &str {
        self.status.as_ref().map(|s| s.id.as_str()).unwrap_or_default()
    }
}
