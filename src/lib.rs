//! Ingress Monitor Kubernetes Operator
//!
//! Keeps uptime checks at external monitoring providers in sync with the
//! hosts of selected Ingresses, using Custom Resource Definitions to declare
//! which Ingresses are monitored and how.

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod providers;
pub mod reconcilers;

pub use error::{Error, Result};
