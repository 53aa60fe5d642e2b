//! Expands Monitors into IngressMonitors and garbage collects stale ones

use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::adapters::ingress_monitor_builder::{build_ingress_monitor, is_controlled_by};
use crate::adapters::naming;
use crate::controllers::cache::{self, get_by_key, list_by_namespace_and_selector, selector_from};
use crate::controllers::Context;
use crate::crd::{IngressMonitor, Monitor, MonitorTemplateSpec, INGRESS_HOST_LABEL, MONITOR_LABEL};
use crate::{Error, Result};

/// Validate the references of a Monitor
pub fn validate(monitor: &Monitor) -> Result<()> {
    if monitor.spec.provider.name.is_empty() {
        return Err(Error::ValidationError(
            "provider.name cannot be empty".to_string(),
        ));
    }

    if monitor.spec.template.name.is_empty() {
        return Err(Error::ValidationError(
            "template.name cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validate a MonitorTemplate before it is rendered into IngressMonitors
pub fn validate_template(spec: &MonitorTemplateSpec) -> Result<()> {
    if spec.type_.trim().is_empty() {
        return Err(Error::ValidationError("type cannot be empty".to_string()));
    }

    if spec.name.is_empty() {
        return Err(Error::ValidationError("name cannot be empty".to_string()));
    }

    naming::validate_name_template(&spec.name)
        .map_err(|e| Error::ValidationError(format!("name: {}", e)))?;

    for (field, value) in [("checkRate", &spec.check_rate), ("timeout", &spec.timeout)] {
        let Some(value) = value else {
            continue;
        };
        let duration: kube::core::Duration = value.parse().map_err(|e| {
            Error::ValidationError(format!("{} {:?} is not a valid duration: {}", field, value, e))
        })?;
        if duration.is_negative() {
            return Err(Error::ValidationError(format!(
                "{} must not be negative",
                field
            )));
        }
    }

    if matches!(spec.confirmations, Some(c) if c < 0) {
        return Err(Error::ValidationError(
            "confirmations must be >= 0".to_string(),
        ));
    }

    if let Some(endpoint) = spec.http.as_ref().and_then(|http| http.endpoint.as_deref()) {
        if !endpoint.starts_with('/') {
            return Err(Error::ValidationError(format!(
                "http.endpoint {:?} must start with '/'",
                endpoint
            )));
        }
    }

    Ok(())
}

/// Reconcile the Monitor stored under `key`
///
/// Stale IngressMonitors are garbage collected first. Every selected
/// Ingress host then gets an IngressMonitor rendered from the Monitor's
/// Provider and MonitorTemplate. Hosts are handled best-effort: a failure
/// doesn't stop the remaining hosts, but fails the pass.
#[instrument(skip(ctx), fields(queue = "Monitors"))]
pub async fn reconcile(key: &str, ctx: &Context) -> Result<()> {
    let Some(monitor) = get_by_key(&ctx.caches.monitors, key)? else {
        debug!("Monitor no longer exists");
        return Ok(());
    };

    let namespace = monitor.namespace().unwrap_or_default();
    let selector = selector_from(&monitor.spec.selector)?;
    let ingresses = list_by_namespace_and_selector(&ctx.caches.ingresses, &namespace, &selector);

    let collected = garbage_collect(&monitor, &ingresses, ctx).await;

    if ingresses.is_empty() {
        info!(namespace = %namespace, name = %monitor.name_any(), "No ingresses selected");
        return collected;
    }

    validate(&monitor)?;

    let provider = cache::get(&ctx.caches.providers, &namespace, &monitor.spec.provider.name)
        .ok_or_else(|| Error::MissingReference {
            kind: "Provider",
            namespace: namespace.clone(),
            name: monitor.spec.provider.name.clone(),
        })?;
    let template = cache::get(&ctx.caches.templates, &namespace, &monitor.spec.template.name)
        .ok_or_else(|| Error::MissingReference {
            kind: "MonitorTemplate",
            namespace: namespace.clone(),
            name: monitor.spec.template.name.clone(),
        })?;
    validate_template(&template.spec)?;

    let mut desired = Vec::new();
    for ingress in &ingresses {
        for host in naming::rule_hosts(ingress) {
            let im = build_ingress_monitor(&monitor, ingress, &host, &provider, &template)?;
            desired.push((im, ingress.name_any()));
        }
    }

    let mut failed = 0;
    for (im, ingress_name) in &desired {
        match ensure(im, ingress_name, ctx).await {
            Ok(()) => debug!(name = %im.name_any(), "Successfully synced IngressMonitor"),
            Err(e) => {
                failed += 1;
                error!(name = %im.name_any(), error = %e, "Could not ensure IngressMonitor");
            }
        }
    }

    collected?;

    if failed > 0 {
        return Err(Error::SyncError(format!(
            "failed to ensure {} of {} IngressMonitors for Monitor {}",
            failed,
            desired.len(),
            key
        )));
    }

    Ok(())
}

/// Create or update one desired IngressMonitor
///
/// Existing objects keep their metadata and backend id; only our labels,
/// owner references, spec and `status.ingressName` are converged. Nothing is
/// written when those already match. Status is merge-patched so the backend
/// id written by the IngressMonitor reconciler is never overwritten.
async fn ensure(desired: &IngressMonitor, ingress_name: &str, ctx: &Context) -> Result<()> {
    let namespace = desired.namespace().unwrap_or_default();
    let name = desired.name_any();

    let Some(existing) = ctx.store.get(&namespace, &name).await? else {
        ctx.store.create(desired).await?;
        ctx.store
            .patch_status(&namespace, &name, json!({ "ingressName": ingress_name }))
            .await?;
        info!(namespace = %namespace, name = %name, "Created IngressMonitor");
        return Ok(());
    };

    let mut updated = existing.clone();
    updated.labels_mut().extend(desired.labels().clone());
    updated.metadata.owner_references = desired.metadata.owner_references.clone();
    updated.spec = desired.spec.clone();

    if updated.spec != existing.spec
        || updated.metadata.labels != existing.metadata.labels
        || updated.metadata.owner_references != existing.metadata.owner_references
    {
        updated = ctx.store.replace(&updated).await?;
        info!(namespace = %namespace, name = %name, "Updated IngressMonitor");
    }

    let current_ingress = updated
        .status
        .as_ref()
        .map(|status| status.ingress_name.as_str())
        .unwrap_or_default();
    if current_ingress != ingress_name {
        ctx.store
            .patch_status(&namespace, &name, json!({ "ingressName": ingress_name }))
            .await?;
        debug!(namespace = %namespace, name = %name, "Updated IngressMonitor status");
    }

    Ok(())
}

/// Whether one of the selected Ingresses controls the IngressMonitor and
/// still has a rule for its host
pub fn is_active(im: &IngressMonitor, ingresses: &[Arc<Ingress>]) -> bool {
    let Some(host) = im.labels().get(INGRESS_HOST_LABEL) else {
        return false;
    };

    ingresses.iter().any(|ingress| {
        is_controlled_by(im, ingress) && naming::rule_hosts(ingress).iter().any(|h| h == host)
    })
}

/// Delete the Monitor's IngressMonitors that no selected Ingress accounts for
///
/// Every stale object is attempted; the pass fails if any delete failed so it
/// is retried.
pub async fn garbage_collect(
    monitor: &Monitor,
    ingresses: &[Arc<Ingress>],
    ctx: &Context,
) -> Result<()> {
    let namespace = monitor.namespace().unwrap_or_default();
    let monitor_name = monitor.name_any();

    let stale: Vec<Arc<IngressMonitor>> = ctx
        .caches
        .ingress_monitors
        .state()
        .into_iter()
        .filter(|im| im.namespace().as_deref() == Some(namespace.as_str()))
        .filter(|im| im.labels().get(MONITOR_LABEL) == Some(&monitor_name))
        .filter(|im| !is_active(im, ingresses))
        .collect();

    let mut failed = 0;
    for im in &stale {
        let name = im.name_any();
        debug!(namespace = %namespace, name = %name, "Deleting IngressMonitor with GC");
        if let Err(e) = ctx.store.delete(&namespace, &name).await {
            failed += 1;
            error!(namespace = %namespace, name = %name, error = %e, "Could not delete IngressMonitor");
        }
    }

    if failed > 0 {
        return Err(Error::SyncError(format!(
            "failed to garbage collect {} of {} IngressMonitors for Monitor {}/{}",
            failed,
            stale.len(),
            namespace,
            monitor_name
        )));
    }

    Ok(())
}

/// Delete every IngressMonitor generated from a deleted Monitor
pub async fn delete_owned(monitor: &Monitor, ctx: &Context) -> Result<()> {
    let namespace = monitor.namespace().unwrap_or_default();
    let monitor_name = monitor.name_any();

    let labels = BTreeMap::from([(MONITOR_LABEL.to_string(), monitor_name.clone())]);
    let owned = ctx.store.list(&namespace, &labels).await?;

    let mut failed = 0;
    for im in &owned {
        if let Err(e) = ctx.store.delete(&namespace, &im.name_any()).await {
            failed += 1;
            error!(namespace = %namespace, name = %im.name_any(), error = %e, "Could not delete IngressMonitor");
        }
    }

    if failed > 0 {
        return Err(Error::SyncError(format!(
            "failed to delete {} of {} IngressMonitors of Monitor {}/{}",
            failed,
            owned.len(),
            namespace,
            monitor_name
        )));
    }

    info!(namespace = %namespace, name = %monitor_name, deleted = owned.len(), "Deleted IngressMonitors of Monitor");
    Ok(())
}
