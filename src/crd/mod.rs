//! Custom Resource Definitions for the Ingress Monitor Operator

mod ingress_monitor;
mod monitor;
mod monitor_template;
mod provider;

pub use ingress_monitor::*;
pub use monitor::*;
pub use monitor_template::*;
pub use provider::*;

use kube::CustomResourceExt;

/// Label holding the name of the Monitor an IngressMonitor was generated from
pub const MONITOR_LABEL: &str = "ingressmonitor.sphc.io/monitor";

/// Label holding the name of the Ingress an IngressMonitor was generated for
pub const INGRESS_LABEL: &str = "ingressmonitor.sphc.io/ingress";

/// Label holding the raw Ingress rule host
pub const INGRESS_HOST_LABEL: &str = "ingressmonitor.sphc.io/ingress-path";

/// Generate CRD YAML manifests for all custom resources
pub fn generate_crds() -> serde_yaml::Result<Vec<String>> {
    Ok(vec![
        serde_yaml::to_string(&Provider::crd())?,
        serde_yaml::to_string(&MonitorTemplate::crd())?,
        serde_yaml::to_string(&Monitor::crd())?,
        serde_yaml::to_string(&IngressMonitor::crd())?,
    ])
}
