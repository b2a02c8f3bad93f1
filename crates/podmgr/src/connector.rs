//! # Cluster Connector
//!
//! Builds an authenticated [`KubePodClient`]. Credentials come from the pod's
//! service account when the in-cluster signal is present, and from the local
//! kubeconfig file otherwise. There is no fallback between the two: a failure
//! on the selected path is a [`PodmgrError::Config`].

use std::path::PathBuf;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info};

use crate::client::KubePodClient;
use crate::config::ConnectorConfig;
use crate::error::{PodmgrError, Result};

/// Where credentials will be loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Service account token and CA mounted into the pod.
    InCluster,
    /// A kubeconfig file on the local filesystem.
    Kubeconfig(PathBuf),
}

/// Constructed once per process and used to obtain the cluster client.
#[derive(Debug, Clone, Default)]
pub struct ClusterConnector {
    config: ConnectorConfig,
}

impl ClusterConnector {
    #[must_use]
    pub fn new(config: ConnectorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Decide which credentials [`connect`](Self::connect) will use.
    ///
    /// # Errors
    ///
    /// Returns [`PodmgrError::Config`] when not in a cluster and no home
    /// directory can be determined.
    pub fn credential_source(&self) -> Result<CredentialSource> {
        if self.config.in_cluster() {
            return Ok(CredentialSource::InCluster);
        }

        self.config
            .resolved_kubeconfig_path()
            .map(CredentialSource::Kubeconfig)
            .ok_or_else(|| {
                PodmgrError::Config("could not determine home directory for kubeconfig".into())
            })
    }

    /// Obtain an authenticated client.
    ///
    /// # Errors
    ///
    /// Returns [`PodmgrError::Config`] if the selected credentials cannot be
    /// loaded or the client cannot be constructed from them.
    pub async fn connect(&self) -> Result<KubePodClient> {
        let source = self.credential_source()?;
        debug!(?source, "Selected credential source");

        let kube_config = match &source {
            CredentialSource::InCluster => Config::incluster().map_err(|e| {
                PodmgrError::Config(format!("in-cluster credentials unavailable: {e}"))
            })?,
            CredentialSource::Kubeconfig(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    PodmgrError::Config(format!(
                        "failed to read kubeconfig {}: {e}",
                        path.display()
                    ))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| {
                        PodmgrError::Config(format!(
                            "invalid kubeconfig {}: {e}",
                            path.display()
                        ))
                    })?
            }
        };

        let client = Client::try_from(kube_config)
            .map_err(|e| PodmgrError::Config(format!("failed to build client: {e}")))?;

        info!(?source, "Connected to cluster");
        Ok(KubePodClient::new(client, self.config.request_timeout))
    }
}
