//! Routing of watch events to work queues and of queued keys to reconcilers

use async_trait::async_trait;
use futures::FutureExt;
use kube::runtime::watcher;
use kube::Resource;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tracing::{debug, error, warn};

use super::cache::{count_by_namespace, key_for};
use super::workqueue::WorkQueue;
use super::Context;
use crate::crd::{IngressMonitor, Monitor};
use crate::metrics::{
    INGRESS_MONITORS_TOTAL, RECONCILE_DURATION, RECONCILIATIONS, RECONCILIATION_ERRORS,
};
use crate::reconcilers;
use crate::Result;

/// A resource kind with its own work queue and reconciler
#[async_trait]
pub trait Reconcilable: Resource<DynamicType = ()> + Clone + Send + Sync + 'static {
    /// Name of the kind's work queue
    const QUEUE: &'static str;

    /// Converge the object stored under `key`
    async fn reconcile(key: &str, ctx: &Context) -> Result<()>;

    /// Clean up after the object was removed from the store
    async fn on_delete(obj: &Self, ctx: &Context) -> Result<()>;

    /// Called after the cache changed or finished a complete listing
    fn observed(_ctx: &Context) {}
}

#[async_trait]
impl Reconcilable for Monitor {
    const QUEUE: &'static str = "Monitors";

    async fn reconcile(key: &str, ctx: &Context) -> Result<()> {
        reconcilers::monitor::reconcile(key, ctx).await
    }

    async fn on_delete(obj: &Self, ctx: &Context) -> Result<()> {
        reconcilers::monitor::delete_owned(obj, ctx).await
    }
}

#[async_trait]
impl Reconcilable for IngressMonitor {
    const QUEUE: &'static str = "IngressMonitors";

    async fn reconcile(key: &str, ctx: &Context) -> Result<()> {
        reconcilers::ingress_monitor::reconcile(key, ctx).await
    }

    async fn on_delete(obj: &Self, ctx: &Context) -> Result<()> {
        reconcilers::ingress_monitor::delete_check(obj, ctx).await
    }

    fn observed(ctx: &Context) {
        record_managed(ctx);
    }
}

/// Publish the number of cached IngressMonitors per namespace
///
/// Namespaces that no longer hold any IngressMonitor are reset to zero.
fn record_managed(ctx: &Context) {
    let counts = count_by_namespace(&ctx.caches.ingress_monitors);
    let mut reported = ctx
        .managed_namespaces
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    for namespace in reported.iter().filter(|ns| !counts.contains_key(*ns)) {
        INGRESS_MONITORS_TOTAL
            .with_label_values(&[namespace.as_str()])
            .set(0.0);
    }
    for (namespace, managed) in &counts {
        INGRESS_MONITORS_TOTAL
            .with_label_values(&[namespace.as_str()])
            .set(*managed as f64);
    }
    *reported = counts.into_keys().collect();
}

/// Translate a watch event into a queued key or a delete handler
///
/// Objects of the initial listing are only queued; observers run once the
/// listing is complete and the cache holds all of it. Delete handlers run on
/// their own task so a slow backend never stalls the watch.
pub fn handle_event<K: Reconcilable>(
    event: &watcher::Event<K>,
    queue: &WorkQueue<String>,
    ctx: &Arc<Context>,
) {
    match event {
        watcher::Event::Apply(obj) => {
            K::observed(ctx);
            queue.add_rate_limited(key_for(obj));
        }
        watcher::Event::InitApply(obj) => queue.add_rate_limited(key_for(obj)),
        watcher::Event::InitDone => K::observed(ctx),
        watcher::Event::Delete(obj) => {
            K::observed(ctx);
            let key = key_for(obj);
            debug!(queue = K::QUEUE, key = %key, "Handling delete");

            let obj = obj.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                if let Err(e) = K::on_delete(&obj, &ctx).await {
                    error!(queue = K::QUEUE, key = %key, error = %e, "Delete handler failed");
                }
            });
        }
        watcher::Event::Init => {}
    }
}

/// Process one key from the queue. Returns `false` once the queue is shut down.
pub async fn process_next_item<K: Reconcilable>(queue: &WorkQueue<String>, ctx: &Context) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };

    let start = Instant::now();
    RECONCILIATIONS.with_label_values(&[K::QUEUE]).inc();

    let result = AssertUnwindSafe(K::reconcile(&key, ctx))
        .catch_unwind()
        .await;

    RECONCILE_DURATION
        .with_label_values(&[K::QUEUE])
        .observe(start.elapsed().as_secs_f64());

    match result {
        Ok(Ok(())) => {
            queue.forget(&key);
            debug!(queue = K::QUEUE, key = %key, "Successfully synced");
        }
        Ok(Err(e)) if !e.is_retryable() => {
            RECONCILIATION_ERRORS.with_label_values(&[K::QUEUE]).inc();
            queue.forget(&key);
            error!(queue = K::QUEUE, key = %key, error = %e, "Error syncing, not retrying");
        }
        Ok(Err(e)) => {
            RECONCILIATION_ERRORS.with_label_values(&[K::QUEUE]).inc();
            warn!(
                queue = K::QUEUE,
                key = %key,
                error = %e,
                requeues = queue.num_requeues(&key),
                "Error syncing, requeuing"
            );
            queue.add_rate_limited(key.clone());
        }
        Err(panic) => {
            RECONCILIATION_ERRORS.with_label_values(&[K::QUEUE]).inc();
            error!(
                queue = K::QUEUE,
                key = %key,
                panic = panic_message(panic.as_ref()),
                "Reconcile panicked, requeuing"
            );
            queue.add_rate_limited(key.clone());
        }
    }

    queue.done(&key);
    true
}

/// Drain the queue until it is shut down
pub async fn run_worker<K: Reconcilable>(queue: WorkQueue<String>, ctx: Arc<Context>) {
    while process_next_item::<K>(&queue, &ctx).await {}
    debug!(queue = K::QUEUE, "Worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
