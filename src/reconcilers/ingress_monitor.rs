//! Syncs IngressMonitors with their monitoring backend

use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::controllers::cache::get_by_key;
use crate::controllers::Context;
use crate::crd::IngressMonitor;
use crate::metrics::{SYNC_FAILED, SYNC_SUCCESS, SYNC_TOTAL};
use crate::Result;

/// Reconcile the IngressMonitor stored under `key`
///
/// Creates the check when the object has no backend id yet and updates it
/// otherwise. When the backend hands back a different id the new id is
/// written to the status subresource.
#[instrument(skip(ctx), fields(queue = "IngressMonitors"))]
pub async fn reconcile(key: &str, ctx: &Context) -> Result<()> {
    let Some(im) = get_by_key(&ctx.caches.ingress_monitors, key)? else {
        debug!("IngressMonitor no longer exists");
        return Ok(());
    };

    let namespace = im.namespace().unwrap_or_default();
    let result = sync(&im, ctx).await;
    record_sync(&namespace, result.is_ok());
    result
}

async fn sync(im: &IngressMonitor, ctx: &Context) -> Result<()> {
    let client = ctx.providers.from(&im.spec.provider).await?;

    let current = im.backend_id();
    let id = if current.is_empty() {
        client.create(&im.spec.template).await?
    } else {
        client.update(current, &im.spec.template).await?
    };

    if id != current {
        let namespace = im.namespace().unwrap_or_default();
        ctx.store
            .patch_status(&namespace, &im.name_any(), json!({ "id": id }))
            .await?;
        info!(
            namespace = %namespace,
            name = %im.name_any(),
            id = %id,
            "Stored backend id"
        );
    }

    Ok(())
}

/// Remove the check of a deleted IngressMonitor from its backend
///
/// Objects that were never created with the backend have nothing to remove.
pub async fn delete_check(im: &IngressMonitor, ctx: &Context) -> Result<()> {
    let id = im.backend_id();
    if id.is_empty() {
        debug!(name = %im.name_any(), "IngressMonitor has no backend id, nothing to delete");
        return Ok(());
    }

    let client = ctx.providers.from(&im.spec.provider).await?;
    client.delete(id).await?;

    info!(
        namespace = %im.namespace().unwrap_or_default(),
        name = %im.name_any(),
        id,
        "Deleted check from provider"
    );
    Ok(())
}

fn record_sync(namespace: &str, success: bool) {
    SYNC_TOTAL.with_label_values(&[namespace]).inc();
    if success {
        SYNC_SUCCESS.with_label_values(&[namespace]).inc();
    } else {
        SYNC_FAILED.with_label_values(&[namespace]).inc();
    }
}
