//! Monitoring backends
//!
//! A backend is reached through a [`ProviderClient`], built on demand by the
//! [`ProviderFactory`] registered for the provider's `type`. Factories are
//! registered once at startup; the [`ProviderRegistry`] is read-only after
//! that and shared behind an `Arc`.

pub mod logger;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::crd::{MonitorTemplateSpec, NamespacedProvider};
use crate::{Error, Result};

/// Lifecycle operations of a check with a monitoring backend
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Create a check and return the identifier the backend assigned to it
    async fn create(&self, template: &MonitorTemplateSpec) -> Result<String>;

    /// Update the check with the given identifier.
    ///
    /// Returns the identifier of the check after the update. When the check
    /// was removed from the backend, the backend recreates it and returns the
    /// new identifier instead of failing.
    async fn update(&self, id: &str, template: &MonitorTemplateSpec) -> Result<String>;

    /// Delete the check with the given identifier
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Builds a client from a provider's configuration
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn build(&self, provider: &NamespacedProvider) -> Result<Arc<dyn ProviderClient>>;
}

#[async_trait]
impl<F> ProviderFactory for F
where
    F: Fn(&NamespacedProvider) -> Result<Arc<dyn ProviderClient>> + Send + Sync,
{
    async fn build(&self, provider: &NamespacedProvider) -> Result<Arc<dyn ProviderClient>> {
        self(provider)
    }
}

/// Provider type to factory mapping
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a provider type, replacing any previous one
    pub fn register<F>(&mut self, provider_type: impl Into<String>, factory: F)
    where
        F: ProviderFactory + 'static,
    {
        self.factories.insert(provider_type.into(), Arc::new(factory));
    }

    /// Whether a factory is registered for the type
    pub fn contains(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Registered provider types, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Build a client for the given provider configuration
    pub async fn from(&self, provider: &NamespacedProvider) -> Result<Arc<dyn ProviderClient>> {
        let factory = self
            .factories
            .get(&provider.spec.type_)
            .ok_or_else(|| Error::ProviderNotFound(provider.spec.type_.clone()))?;

        factory.build(provider).await
    }
}
