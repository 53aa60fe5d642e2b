//! Monitor Custom Resource Definition

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Monitor resource specification
///
/// Selects Ingresses by label and declares which Provider and
/// MonitorTemplate to use for them. A Monitor carries no status; the
/// IngressMonitors generated from it do.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ingressmonitor.sphc.io",
    version = "v1alpha1",
    kind = "Monitor",
    plural = "monitors",
    singular = "monitor",
    namespaced,
    printcolumn = r#"{"name": "Provider", "type": "string", "jsonPath": ".spec.provider.name"}"#,
    printcolumn = r#"{"name": "Template", "type": "string", "jsonPath": ".spec.template.name"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSpec {
    /// Label selector for the Ingresses to monitor
    pub selector: LabelSelector,

    /// Provider in the same namespace
    pub provider: LocalObjectRef,

    /// MonitorTemplate in the same namespace
    pub template: LocalObjectRef,
}

/// Reference to an object in the same namespace
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct LocalObjectRef {
    pub name: String,
}
