//! Operator lifecycle: watch sources, cache sync gate, workers and resync

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::cache::{key_for, wait_for_cache_sync, Caches, Writers};
use super::dispatcher::{handle_event, run_worker, Reconcilable};
use super::workqueue::WorkQueue;
use super::Context;
use crate::crd::{IngressMonitor, Monitor, MonitorTemplate, Provider};
use crate::Result;

/// Default number of workers per queue
pub const DEFAULT_WORKERS: usize = 4;

/// Default interval between full re-enqueues of every cached object
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(30);

/// Stream of watch events for one kind
pub type EventStream<K> = BoxStream<'static, watcher::Result<watcher::Event<K>>>;

/// Runtime settings of the operator
#[derive(Clone, Debug)]
pub struct Settings {
    /// Workers per queue
    pub workers: usize,
    /// Resync interval, zero disables resync
    pub resync_period: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            resync_period: DEFAULT_RESYNC_PERIOD,
        }
    }
}

/// Watch event sources for every cached kind
pub struct Sources {
    pub monitors: EventStream<Monitor>,
    pub ingress_monitors: EventStream<IngressMonitor>,
    pub ingresses: EventStream<Ingress>,
    pub providers: EventStream<Provider>,
    pub templates: EventStream<MonitorTemplate>,
}

impl Sources {
    /// Watch the API server, restricted to `namespace` when given
    pub fn from_client(client: Client, namespace: Option<&str>) -> Self {
        Self {
            monitors: watch(client.clone(), namespace),
            ingress_monitors: watch(client.clone(), namespace),
            ingresses: watch(client.clone(), namespace),
            providers: watch(client.clone(), namespace),
            templates: watch(client, namespace),
        }
    }
}

fn watch<K>(client: Client, namespace: Option<&str>) -> EventStream<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + 'static,
{
    let api: Api<K> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed()
}

/// Runs the Monitor and IngressMonitor controllers
pub struct Operator {
    ctx: Arc<Context>,
    writers: Writers,
    settings: Settings,
    monitors: WorkQueue<String>,
    ingress_monitors: WorkQueue<String>,
}

impl Operator {
    /// Create an operator with default queues
    pub fn new(ctx: Arc<Context>, writers: Writers, settings: Settings) -> Self {
        Self::with_queues(
            ctx,
            writers,
            settings,
            WorkQueue::new(Monitor::QUEUE),
            WorkQueue::new(IngressMonitor::QUEUE),
        )
    }

    /// Create an operator with the given Monitor and IngressMonitor queues
    pub fn with_queues(
        ctx: Arc<Context>,
        writers: Writers,
        settings: Settings,
        monitors: WorkQueue<String>,
        ingress_monitors: WorkQueue<String>,
    ) -> Self {
        Self {
            ctx,
            writers,
            settings,
            monitors,
            ingress_monitors,
        }
    }

    /// Feed the caches, wait for them to sync, then process both queues until
    /// `shutdown` fires. In-flight reconciles finish before this returns.
    pub async fn run(self, sources: Sources, shutdown: CancellationToken) -> Result<()> {
        let Operator {
            ctx,
            writers,
            settings,
            monitors,
            ingress_monitors,
        } = self;

        info!("Starting IngressMonitor controller");

        let informers = vec![
            tokio::spawn(drive(
                "Ingress",
                reflector(writers.ingresses, sources.ingresses),
                shutdown.clone(),
            )),
            tokio::spawn(drive(
                "Provider",
                reflector(writers.providers, sources.providers),
                shutdown.clone(),
            )),
            tokio::spawn(drive(
                "MonitorTemplate",
                reflector(writers.templates, sources.templates),
                shutdown.clone(),
            )),
            tokio::spawn(dispatch(
                reflector(writers.monitors, sources.monitors),
                monitors.clone(),
                ctx.clone(),
                shutdown.clone(),
            )),
            tokio::spawn(dispatch(
                reflector(writers.ingress_monitors, sources.ingress_monitors),
                ingress_monitors.clone(),
                ctx.clone(),
                shutdown.clone(),
            )),
        ];

        if let Err(e) = wait_for_cache_sync(&ctx.caches, &shutdown).await {
            monitors.shut_down();
            ingress_monitors.shut_down();
            for informer in &informers {
                informer.abort();
            }
            return Err(e);
        }

        info!(workers = settings.workers, "Starting workers");
        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(settings.workers * 2);
        for _ in 0..settings.workers {
            workers.push(tokio::spawn(run_worker::<Monitor>(
                monitors.clone(),
                ctx.clone(),
            )));
            workers.push(tokio::spawn(run_worker::<IngressMonitor>(
                ingress_monitors.clone(),
                ctx.clone(),
            )));
        }

        let resync = (!settings.resync_period.is_zero()).then(|| {
            tokio::spawn(resync(
                ctx.caches.clone(),
                monitors.clone(),
                ingress_monitors.clone(),
                settings.resync_period,
                shutdown.clone(),
            ))
        });

        info!("Started workers");
        shutdown.cancelled().await;
        info!("Shutting down workers");

        monitors.shut_down();
        ingress_monitors.shut_down();

        for handle in workers.into_iter().chain(resync).chain(informers) {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    warn!(error = %e, "Task panicked during shutdown");
                }
            }
        }

        info!("IngressMonitor controller stopped");
        Ok(())
    }
}

/// Keep a passive cache up to date
async fn drive<K, S>(kind: &'static str, stream: S, shutdown: CancellationToken)
where
    S: Stream<Item = watcher::Result<watcher::Event<K>>>,
{
    let mut stream = std::pin::pin!(stream);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = stream.next() => match next {
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!(kind, error = %e, "Watch error"),
                None => break,
            },
        }
    }
}

/// Keep a controlled kind's cache up to date and dispatch its events
async fn dispatch<K, S>(
    stream: S,
    queue: WorkQueue<String>,
    ctx: Arc<Context>,
    shutdown: CancellationToken,
) where
    K: Reconcilable,
    S: Stream<Item = watcher::Result<watcher::Event<K>>>,
{
    let mut stream = std::pin::pin!(stream);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = stream.next() => match next {
                Some(Ok(event)) => handle_event(&event, &queue, &ctx),
                Some(Err(e)) => warn!(queue = K::QUEUE, error = %e, "Watch error"),
                None => break,
            },
        }
    }
}

/// Re-enqueue every cached Monitor and IngressMonitor once per period
async fn resync(
    caches: Caches,
    monitors: WorkQueue<String>,
    ingress_monitors: WorkQueue<String>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                for monitor in caches.monitors.state() {
                    monitors.add_rate_limited(key_for(monitor.as_ref()));
                }
                for im in caches.ingress_monitors.state() {
                    ingress_monitors.add_rate_limited(key_for(im.as_ref()));
                }
            }
        }
    }
}
