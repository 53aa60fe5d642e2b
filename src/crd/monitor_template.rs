//! MonitorTemplate Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MonitorTemplate resource specification
///
/// The same structure is embedded in every IngressMonitor, with `name`
/// rendered and `http.url` computed for the selected host.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ingressmonitor.sphc.io",
    version = "v1alpha1",
    kind = "MonitorTemplate",
    plural = "monitortemplates",
    singular = "monitortemplate",
    namespaced,
    printcolumn = r#"{"name": "Type", "type": "string", "jsonPath": ".spec.type"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MonitorTemplateSpec {
    /// Type of check (e.g. HTTP)
    #[serde(rename = "type")]
    pub type_: String,

    /// Name of the check. Supports the `{{.IngressName}}` and
    /// `{{.IngressNamespace}}` placeholders.
    pub name: String,

    /// Time between checks, as a duration string (e.g. 30s).
    /// Defaults to the provider's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_rate: Option<String>,

    /// Number of failed checks before the check is marked as failing.
    /// Defaults to the provider's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<i32>,

    /// How long a single check may take, as a duration string.
    /// Defaults to the provider's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// HTTP check configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpTemplate>,
}

/// HTTP check configuration
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpTemplate {
    /// Fully qualified URL of the check. Computed by the operator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Path to check on the selected host (default: /_healthz)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Extra header sent with the check request
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub custom_header: String,

    /// User agent used to perform the check
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_agent: String,

    /// Validate the TLS certificate of the host
    #[serde(default)]
    pub verify_certificate: bool,

    /// String the response body must contain
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub should_contain: String,

    /// String the response body must not contain
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub should_not_contain: String,
}
