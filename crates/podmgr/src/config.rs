//! Connector and runtime configuration.
//!
//! Everything here has a sensible default so `podmgr` works unconfigured
//! inside a runner pod. The CLI overrides individual fields from flags and
//! environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Namespace used when the caller does not supply one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Environment variable holding the runner's own pod name.
pub const ENV_RUNNER_POD_NAME: &str = "ACTIONS_RUNNER_POD_NAME";

/// Environment variable whose presence signals execution inside a cluster.
pub const ENV_IN_CLUSTER: &str = "KUBERNETES_SERVICE_HOST";

/// Default deadline applied to every cluster request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings consumed by [`crate::connector::ClusterConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Explicit credential file. `None` means `~/.kube/config`.
    pub kubeconfig_path: Option<PathBuf>,

    /// Environment variable checked to decide between in-cluster and local
    /// credentials.
    pub in_cluster_env: String,

    /// Deadline for each individual `get`/`update` call.
    pub request_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            kubeconfig_path: None,
            in_cluster_env: ENV_IN_CLUSTER.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ConnectorConfig {
    /// Override the credential file location.
    #[must_use]
    pub fn with_kubeconfig_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig_path = Some(path.into());
        self
    }

    /// Override the per-request deadline.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Whether the in-cluster signal is present in the environment.
    #[must_use]
    pub fn in_cluster(&self) -> bool {
        std::env::var(&self.in_cluster_env).is_ok_and(|v| !v.is_empty())
    }

    /// Resolved local credential file, if a home directory can be found.
    #[must_use]
    pub fn resolved_kubeconfig_path(&self) -> Option<PathBuf> {
        self.kubeconfig_path
            .clone()
            .or_else(default_kubeconfig_path)
    }
}

/// Get the default kubeconfig path (~/.kube/config).
#[must_use]
pub fn default_kubeconfig_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".kube").join("config"))
}

/// Resolve the namespace, falling back to [`DEFAULT_NAMESPACE`].
#[must_use]
pub fn resolve_namespace(namespace: Option<&str>) -> &str {
    match namespace.map(str::trim) {
        Some(ns) if !ns.is_empty() => ns,
        _ => DEFAULT_NAMESPACE,
    }
}
