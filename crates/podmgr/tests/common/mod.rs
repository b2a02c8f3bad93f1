//! In-memory cluster that enforces the API server's ephemeral container
//! rules: conditional writes on resource version and unique names.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::EphemeralContainer;
use podmgr::{PodClient, PodSnapshot, PodmgrError, Result};

#[derive(Debug, Clone, Default)]
pub struct StoredPod {
    pub containers: Vec<EphemeralContainer>,
    pub version: u64,
}

type Hook = Box<dyn FnOnce(&mut StoredPod) + Send>;

#[derive(Default)]
pub struct FakeCluster {
    pods: Mutex<HashMap<(String, String), StoredPod>>,
    after_get: Mutex<Option<Hook>>,
    pub gets: AtomicUsize,
    pub updates: AtomicUsize,
}

#[allow(dead_code)]
impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod(self, namespace: &str, name: &str, version: u64) -> Self {
        self.pods.lock().unwrap().insert(
            (namespace.to_string(), name.to_string()),
            StoredPod {
                containers: Vec::new(),
                version,
            },
        );
        self
    }

    /// Run `hook` against the stored pod right after the next `get`
    /// returns, as if another writer got in between fetch and submit.
    pub fn interleave(&self, hook: impl FnOnce(&mut StoredPod) + Send + 'static) {
        *self.after_get.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn pod(&self, namespace: &str, name: &str) -> StoredPod {
        self.pods
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .expect("pod exists")
    }

    pub fn names(&self, namespace: &str, name: &str) -> Vec<String> {
        self.pod(namespace, name)
            .containers
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    pub fn calls(&self) -> (usize, usize) {
        (
            self.gets.load(Ordering::SeqCst),
            self.updates.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl PodClient for FakeCluster {
    async fn get(&self, namespace: &str, name: &str) -> Result<PodSnapshot> {
        self.gets.fetch_add(1, Ordering::SeqCst);

        let snapshot = {
            let mut pods = self.pods.lock().unwrap();
            let pod = pods
                .get_mut(&(namespace.to_string(), name.to_string()))
                .ok_or_else(|| PodmgrError::NotFound {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })?;

            let snapshot = PodSnapshot {
                containers: pod.containers.clone(),
                statuses: Vec::new(),
                resource_version: pod.version.to_string(),
            };

            if let Some(hook) = self.after_get.lock().unwrap().take() {
                hook(pod);
            }
            snapshot
        };

        tokio::task::yield_now().await;
        Ok(snapshot)
    }

    async fn update(
        &self,
        namespace: &str,
        name: &str,
        containers: Vec<EphemeralContainer>,
        expected_version: &str,
    ) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);

        let mut pods = self.pods.lock().unwrap();
        let pod = pods
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| PodmgrError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        if pod.version.to_string() != expected_version {
            return Err(PodmgrError::Conflict {
                namespace: namespace.to_string(),
                name: name.to_string(),
                expected_version: expected_version.to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        if !containers.iter().all(|c| seen.insert(c.name.clone())) {
            return Err(PodmgrError::Rejected {
                operation: "update".to_string(),
                code: 422,
                message: "duplicate ephemeral container name".to_string(),
            });
        }

        // Existing entries can be neither dropped nor changed.
        if containers.len() < pod.containers.len()
            || containers[..pod.containers.len()] != pod.containers[..]
        {
            return Err(PodmgrError::Rejected {
                operation: "update".to_string(),
                code: 422,
                message: "existing ephemeral containers may not be changed".to_string(),
            });
        }

        pod.containers = containers;
        pod.version += 1;
        Ok(())
    }
}
