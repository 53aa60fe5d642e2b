//! Command line and environment configuration

use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::controllers::operator::{DEFAULT_WORKERS, Settings};
use crate::{Error, Result};

/// Operator configuration
#[derive(Parser, Clone, Debug)]
#[command(name = "ingress-monitor-operator", version, about)]
pub struct Config {
    /// Namespace to watch, all namespaces when empty
    #[arg(short, long, env = "WATCH_NAMESPACE", default_value = "")]
    pub namespace: String,

    /// Path to a kubeconfig file, in-cluster configuration when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Address of the Kubernetes API server, overrides the kubeconfig
    #[arg(long)]
    pub master_url: Option<String>,

    /// Interval at which every object is reconciled again, `0s` disables it
    #[arg(long, default_value = "30s")]
    pub resync_period: String,

    /// Address the metrics and health server binds to
    #[arg(long, default_value = "0.0.0.0")]
    pub http_addr: IpAddr,

    /// Port of the metrics and health server
    #[arg(long, default_value_t = 9090)]
    pub http_port: u16,

    /// Workers per queue
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
}

impl Config {
    /// Namespace restriction of the watches
    pub fn watch_namespace(&self) -> Option<&str> {
        Some(self.namespace.as_str()).filter(|ns| !ns.is_empty())
    }

    /// Parsed resync period
    pub fn resync_period(&self) -> Result<Duration> {
        let period: kube::core::Duration = self.resync_period.parse().map_err(|e| {
            Error::ConfigError(format!(
                "invalid resync period {:?}: {}",
                self.resync_period, e
            ))
        })?;
        if period.is_negative() {
            return Err(Error::ConfigError(format!(
                "resync period {:?} must not be negative",
                self.resync_period
            )));
        }
        Ok(period.into())
    }

    /// Operator runtime settings
    pub fn settings(&self) -> Result<Settings> {
        if self.workers == 0 {
            return Err(Error::ConfigError("workers must be >= 1".to_string()));
        }
        Ok(Settings {
            workers: self.workers,
            resync_period: self.resync_period()?,
        })
    }

    /// Socket address of the metrics and health server
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http_addr, self.http_port)
    }

    /// Build a Kubernetes client from the kubeconfig, the environment or the
    /// in-cluster service account
    pub async fn client(&self) -> Result<Client> {
        let mut config = match &self.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|e| Error::ConfigError(format!("reading kubeconfig: {}", e)))?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::ConfigError(format!("loading kubeconfig: {}", e)))?
            }
            None => kube::Config::infer()
                .await
                .map_err(|e| Error::ConfigError(format!("inferring configuration: {}", e)))?,
        };

        if let Some(url) = &self.master_url {
            config.cluster_url = url
                .parse()
                .map_err(|e| Error::ConfigError(format!("invalid master url {:?}: {}", url, e)))?;
        }

        Ok(Client::try_from(config)?)
    }
}
