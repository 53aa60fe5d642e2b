//! Adapters between Monitors, Ingresses and the IngressMonitors built from them

pub mod ingress_monitor_builder;
pub mod ingress_monitor_store;
pub mod naming;
