//! Prometheus metrics for the Ingress Monitor Operator
//!
//! Exposes reconcile counters, per-namespace sync gauges and the health
//! endpoints on a single HTTP listener.

pub mod prometheus;

pub use self::prometheus::*;
