//! Error types for the Ingress Monitor Operator

/// Result type for the operator
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the operator
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(String),

    /// A write lost an optimistic concurrency race
    #[error("Conflict: {0}")]
    Conflict(String),

    /// One or more caches never reported as synced before shutdown
    #[error("could not sync caches")]
    CacheSyncError,

    /// No factory is registered for the provider type
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// The monitoring backend rejected a call
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// A Provider or MonitorTemplate referenced by a Monitor does not exist
    #[error("Could not get {kind} {namespace}/{name}")]
    MissingReference {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// Malformed name template
    #[error("Template error: {0}")]
    TemplateError(String),

    /// Malformed label selector
    #[error("Selector error: {0}")]
    SelectorError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Some objects of a best-effort pass could not be synced
    #[error("Sync error: {0}")]
    SyncError(String),
}

impl Error {
    /// Whether the key should be requeued with backoff.
    ///
    /// Malformed input only changes through an edit of the resource itself,
    /// which the periodic resync picks up, so it is not retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::TemplateError(_) | Error::SelectorError(_) | Error::ValidationError(_)
        )
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 409 => Error::Conflict(ae.message),
            other => Error::KubeError(other.to_string()),
        }
    }
}
