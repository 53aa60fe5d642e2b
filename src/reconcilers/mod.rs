//! Reconciliation logic for the controlled kinds

pub mod ingress_monitor;
pub mod monitor;
