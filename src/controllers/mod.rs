//! Watch, queue and worker machinery driving the reconcilers

pub mod cache;
pub mod dispatcher;
pub mod operator;
pub mod workqueue;

pub use cache::{Caches, Writers};
pub use dispatcher::Reconcilable;
pub use operator::{Operator, Settings, Sources};
pub use workqueue::WorkQueue;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::adapters::ingress_monitor_store::IngressMonitorStore;
use crate::providers::ProviderRegistry;

/// Shared context for controllers
pub struct Context {
    /// Write access to IngressMonitors
    pub store: Arc<dyn IngressMonitorStore>,
    /// Watch-fed caches of every kind the reconcilers read
    pub caches: Caches,
    /// Provider factories, read-only after startup
    pub providers: Arc<ProviderRegistry>,
    /// Namespaces the IngressMonitor gauge has been reported for
    pub(crate) managed_namespaces: Mutex<BTreeSet<String>>,
}

impl Context {
    /// Create a new context
    pub fn new(
        store: Arc<dyn IngressMonitorStore>,
        caches: Caches,
        providers: Arc<ProviderRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            caches,
            providers,
            managed_namespaces: Mutex::new(BTreeSet::new()),
        })
    }
}
