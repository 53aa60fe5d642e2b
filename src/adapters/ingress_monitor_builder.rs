//! IngressMonitor builder for a selected Ingress rule host

use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

use crate::adapters::naming::{self, NameFields};
use crate::crd::{
    IngressMonitor, IngressMonitorSpec, Monitor, MonitorTemplate, NamespacedProvider, Provider,
    INGRESS_HOST_LABEL, INGRESS_LABEL, MONITOR_LABEL,
};
use crate::Result;

/// Build the desired IngressMonitor for one host of a selected Ingress
///
/// Provider and template data are copied into the object, so later edits to
/// either only take effect when the Monitor is reconciled again.
pub fn build_ingress_monitor(
    monitor: &Monitor,
    ingress: &Ingress,
    host: &str,
    provider: &Provider,
    template: &MonitorTemplate,
) -> Result<IngressMonitor> {
    let monitor_name = monitor.name_any();
    let ingress_name = ingress.name_any();
    let namespace = ingress.namespace().unwrap_or_default();

    let mut template_spec = template.spec.clone();
    template_spec.name = naming::render_name(
        &template.spec.name,
        NameFields {
            ingress_name: &ingress_name,
            ingress_namespace: &namespace,
        },
    )?;

    let mut http = template_spec.http.take().unwrap_or_default();
    http.url = Some(naming::monitor_url(ingress, host, http.endpoint.as_deref()));
    template_spec.http = Some(http);

    Ok(IngressMonitor {
        metadata: ObjectMeta {
            name: Some(naming::ingress_monitor_name(&ingress_name, host)),
            namespace: Some(namespace),
            labels: Some(build_labels(&monitor_name, &ingress_name, host)),
            owner_references: Some(build_owner_references(monitor, ingress)),
            ..Default::default()
        },
        spec: IngressMonitorSpec {
            provider: NamespacedProvider {
                namespace: monitor.namespace().unwrap_or_default(),
                spec: provider.spec.clone(),
            },
            template: template_spec,
        },
        status: None,
    })
}

/// Labels used to find the IngressMonitors of a Monitor and to match hosts
/// during garbage collection
pub fn build_labels(monitor_name: &str, ingress_name: &str, host: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MONITOR_LABEL.to_string(), monitor_name.to_string());
    labels.insert(INGRESS_LABEL.to_string(), ingress_name.to_string());
    labels.insert(INGRESS_HOST_LABEL.to_string(), host.to_string());
    labels
}

/// Owner references for a generated IngressMonitor.
///
/// The Ingress is the controlling owner; the Monitor is a plain owner since
/// only one controller reference is allowed.
pub fn build_owner_references(monitor: &Monitor, ingress: &Ingress) -> Vec<OwnerReference> {
    vec![
        OwnerReference {
            api_version: Ingress::api_version(&()).to_string(),
            kind: Ingress::kind(&()).to_string(),
            name: ingress.name_any(),
            uid: ingress.uid().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        },
        OwnerReference {
            api_version: Monitor::api_version(&()).to_string(),
            kind: Monitor::kind(&()).to_string(),
            name: monitor.name_any(),
            uid: monitor.uid().unwrap_or_default(),
            controller: None,
            block_owner_deletion: Some(true),
        },
    ]
}

/// Whether the Ingress is the controlling owner of the IngressMonitor
pub fn is_controlled_by(im: &IngressMonitor, ingress: &Ingress) -> bool {
    let Some(uid) = ingress.uid() else {
        return false;
    };
    im.owner_references()
        .iter()
        .any(|owner| owner.controller == Some(true) && owner.uid == uid)
}
