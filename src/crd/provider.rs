//! Provider Custom Resource Definition

use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Provider resource specification
///
/// Describes a monitoring backend. The controller never writes Providers, it
/// copies their spec into every IngressMonitor generated from a Monitor that
/// references it.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ingressmonitor.sphc.io",
    version = "v1alpha1",
    kind = "Provider",
    plural = "providers",
    singular = "provider",
    namespaced,
    printcolumn = r#"{"name": "Type", "type": "string", "jsonPath": ".spec.type"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    /// Provider type, used to look up the backend factory (e.g. Logger)
    #[serde(rename = "type")]
    pub type_: String,

    /// Backend specific configuration, opaque to the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub backend_config: Option<serde_json::Value>,
}

/// A provider spec together with the namespace it was resolved from
///
/// Backends that need to read Secrets use the namespace to find them.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedProvider {
    /// Namespace of the Provider this spec was copied from
    pub namespace: String,

    #[serde(flatten)]
    pub spec: ProviderSpec,
}

fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}
