//! Provider that only logs the calls it receives
//!
//! Useful to try out Monitors and templates without an account at a real
//! monitoring service.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{ProviderClient, ProviderRegistry};
use crate::crd::{MonitorTemplateSpec, NamespacedProvider};
use crate::Result;

/// Provider type the logger is registered under
pub const PROVIDER_TYPE: &str = "Logger";

/// Register the logger provider
pub fn register(registry: &mut ProviderRegistry) {
    registry.register(PROVIDER_TYPE, factory);
}

/// Build a logger client; the configuration is ignored
pub fn factory(provider: &NamespacedProvider) -> Result<Arc<dyn ProviderClient>> {
    Ok(Arc::new(LoggerClient {
        namespace: provider.namespace.clone(),
    }))
}

struct LoggerClient {
    namespace: String,
}

#[async_trait]
impl ProviderClient for LoggerClient {
    async fn create(&self, template: &MonitorTemplateSpec) -> Result<String> {
        info!(
            provider_namespace = %self.namespace,
            check = %template.name,
            url = template.http.as_ref().and_then(|h| h.url.as_deref()).unwrap_or_default(),
            "Creating monitor"
        );
        Ok(template.name.clone())
    }

    async fn update(&self, id: &str, template: &MonitorTemplateSpec) -> Result<String> {
        info!(
            provider_namespace = %self.namespace,
            check = %template.name,
            id,
            "Updating monitor"
        );
        Ok(id.to_string())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        info!(provider_namespace = %self.namespace, id, "Deleting monitor");
        Ok(())
    }
}
