//! # Pod Client
//!
//! The narrow view of the Kubernetes API this crate depends on: fetch a pod's
//! ephemeral containers together with its resource version, and replace the
//! ephemeral container list with a version-checked write.
//!
//! [`KubePodClient`] is the production implementation. Tests substitute their
//! own [`PodClient`].

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ContainerStatus, EphemeralContainer, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{PodmgrError, Result};

/// Subresource that accepts ephemeral container updates.
pub const EPHEMERAL_CONTAINERS_SUBRESOURCE: &str = "ephemeralcontainers";

/// A pod's ephemeral containers as observed at fetch time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodSnapshot {
    /// Ephemeral containers already attached, in API order.
    pub containers: Vec<EphemeralContainer>,

    /// Runtime status reported for the ephemeral containers.
    pub statuses: Vec<ContainerStatus>,

    /// Opaque version token used for optimistic concurrency.
    pub resource_version: String,
}

impl PodSnapshot {
    /// Extract the snapshot from a fetched pod.
    ///
    /// # Errors
    ///
    /// Returns [`PodmgrError::Transient`] if the API server returned a pod
    /// without a resource version.
    pub fn from_pod(pod: &Pod) -> Result<Self> {
        let resource_version = pod
            .metadata
            .resource_version
            .clone()
            .ok_or_else(|| PodmgrError::Transient {
                operation: "get".to_string(),
                message: "pod returned without a resourceVersion".to_string(),
            })?;

        let containers = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.ephemeral_containers.clone())
            .unwrap_or_default();

        let statuses = pod
            .status
            .as_ref()
            .and_then(|status| status.ephemeral_container_statuses.clone())
            .unwrap_or_default();

        Ok(Self {
            containers,
            statuses,
            resource_version,
        })
    }

    /// Whether an ephemeral container called `name` is already attached.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.containers.iter().any(|c| c.name == name)
    }

    /// Summaries of the attached containers, joined with their status.
    #[must_use]
    pub fn attached(&self) -> Vec<AttachedContainer> {
        self.containers
            .iter()
            .map(|c| {
                let status = self.statuses.iter().find(|s| s.name == c.name);
                AttachedContainer {
                    name: c.name.clone(),
                    image: c.image.clone().unwrap_or_default(),
                    interactive: c.stdin.unwrap_or(false) && c.tty.unwrap_or(false),
                    state: status.map_or_else(|| "pending".to_string(), describe_state),
                }
            })
            .collect()
    }
}

/// Read-only summary of one attached ephemeral container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachedContainer {
    pub name: String,
    pub image: String,
    pub interactive: bool,
    pub state: String,
}

fn describe_state(status: &ContainerStatus) -> String {
    let Some(state) = &status.state else {
        return "unknown".to_string();
    };

    if state.running.is_some() {
        "running".to_string()
    } else if let Some(waiting) = &state.waiting {
        match &waiting.reason {
            Some(reason) => format!("waiting ({reason})"),
            None => "waiting".to_string(),
        }
    } else if let Some(terminated) = &state.terminated {
        match &terminated.reason {
            Some(reason) => format!("terminated ({reason}, exit {})", terminated.exit_code),
            None => format!("terminated (exit {})", terminated.exit_code),
        }
    } else {
        "unknown".to_string()
    }
}

/// The two cluster operations the mutator relies on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PodClient: Send + Sync {
    /// Fetch the pod's ephemeral containers and resource version.
    async fn get(&self, namespace: &str, name: &str) -> Result<PodSnapshot>;

    /// Replace the pod's ephemeral container list.
    ///
    /// Must fail with [`PodmgrError::Conflict`] if the stored resource
    /// version differs from `expected_version`, leaving the pod unchanged.
    async fn update(
        &self,
        namespace: &str,
        name: &str,
        containers: Vec<EphemeralContainer>,
        expected_version: &str,
    ) -> Result<()>;
}

/// [`PodClient`] backed by a `kube::Client`, with a deadline on every call.
#[derive(Clone)]
pub struct KubePodClient {
    client: Client,
    request_timeout: Duration,
}

impl KubePodClient {
    /// Wrap an authenticated client.
    #[must_use]
    pub fn new(client: Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl PodClient for KubePodClient {
    #[instrument(skip(self), fields(namespace = %namespace, pod = %name))]
    async fn get(&self, namespace: &str, name: &str) -> Result<PodSnapshot> {
        let pods = self.pods(namespace);

        let pod = tokio::time::timeout(self.request_timeout, pods.get(name))
            .await
            .map_err(|_| PodmgrError::timeout("get", self.request_timeout))?
            .map_err(|e| PodmgrError::from_kube(e, "get", namespace, name, None))?;

        let snapshot = PodSnapshot::from_pod(&pod)?;
        debug!(
            resource_version = %snapshot.resource_version,
            ephemeral_containers = snapshot.containers.len(),
            "Fetched pod"
        );
        Ok(snapshot)
    }

    #[instrument(
        skip(self, containers),
        fields(namespace = %namespace, pod = %name, expected_version = %expected_version)
    )]
    async fn update(
        &self,
        namespace: &str,
        name: &str,
        containers: Vec<EphemeralContainer>,
        expected_version: &str,
    ) -> Result<()> {
        let pods = self.pods(namespace);

        // The subresource only reads spec.ephemeralContainers; resourceVersion
        // makes the replace conditional.
        let body = Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                resource_version: Some(expected_version.to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                ephemeral_containers: Some(containers),
                ..Default::default()
            }),
            status: None,
        };
        let data = serde_json::to_vec(&body)?;

        let updated = tokio::time::timeout(
            self.request_timeout,
            pods.replace_subresource(
                EPHEMERAL_CONTAINERS_SUBRESOURCE,
                name,
                &PostParams::default(),
                data,
            ),
        )
        .await
        .map_err(|_| PodmgrError::timeout("update", self.request_timeout))?
        .map_err(|e| {
            PodmgrError::from_kube(e, "update", namespace, name, Some(expected_version))
        })?;

        debug!(
            new_resource_version = ?updated.metadata.resource_version,
            "Replaced ephemeral containers"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStateWaiting,
        PodStatus,
    };

    fn ephemeral(name: &str, image: &str, interactive: bool) -> EphemeralContainer {
        EphemeralContainer {
            name: name.to_string(),
            image: Some(image.to_string()),
            stdin: Some(interactive),
            tty: Some(interactive),
            ..Default::default()
        }
    }

    fn status(name: &str, state: ContainerState) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            state: Some(state),
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_from_pod() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("runner-123".to_string()),
                resource_version: Some("5".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                ephemeral_containers: Some(vec![ephemeral("job-container", "busybox", false)]),
                ..Default::default()
            }),
            status: None,
        };

        let snapshot = PodSnapshot::from_pod(&pod).unwrap();
        assert_eq!(snapshot.resource_version, "5");
        assert_eq!(snapshot.containers.len(), 1);
        assert!(snapshot.contains("job-container"));
        assert!(!snapshot.contains("debug-container"));
    }

    #[test]
    fn test_snapshot_without_spec_is_empty() {
        let pod = Pod {
            metadata: ObjectMeta {
                resource_version: Some("1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let snapshot = PodSnapshot::from_pod(&pod).unwrap();
        assert!(snapshot.containers.is_empty());
        assert!(snapshot.statuses.is_empty());
    }

    #[test]
    fn test_snapshot_requires_resource_version() {
        let pod = Pod::default();
        assert!(matches!(
            PodSnapshot::from_pod(&pod),
            Err(PodmgrError::Transient { .. })
        ));
    }

    #[test]
    fn test_attached_joins_status() {
        let pod = Pod {
            metadata: ObjectMeta {
                resource_version: Some("9".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                ephemeral_containers: Some(vec![
                    ephemeral("job-container", "busybox", false),
                    ephemeral("debug-container", "alpine", true),
                ]),
                ..Default::default()
            }),
            status: Some(PodStatus {
                ephemeral_container_statuses: Some(vec![
                    status(
                        "job-container",
                        ContainerState {
                            terminated: Some(ContainerStateTerminated {
                                exit_code: 0,
                                reason: Some("Completed".to_string()),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    ),
                    status(
                        "debug-container",
                        ContainerState {
                            running: Some(ContainerStateRunning::default()),
                            ..Default::default()
                        },
                    ),
                ]),
                ..Default::default()
            }),
        };

        let attached = PodSnapshot::from_pod(&pod).unwrap().attached();
        assert_eq!(attached.len(), 2);
        assert_eq!(attached[0].name, "job-container");
        assert_eq!(attached[0].state, "terminated (Completed, exit 0)");
        assert!(!attached[0].interactive);
        assert_eq!(attached[1].image, "alpine");
        assert_eq!(attached[1].state, "running");
        assert!(attached[1].interactive);
    }

    #[test]
    fn test_attached_without_status_is_pending() {
        let snapshot = PodSnapshot {
            containers: vec![ephemeral("job-container", "busybox", false)],
            statuses: vec![],
            resource_version: "2".to_string(),
        };
        assert_eq!(snapshot.attached()[0].state, "pending");
    }

    #[test]
    fn test_waiting_state_reports_reason() {
        let s = status(
            "job-container",
            ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some("ImagePullBackOff".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert_eq!(describe_state(&s), "waiting (ImagePullBackOff)");
    }

    mod kube_backed {
        use super::*;
        use std::convert::Infallible;
        use std::sync::{Arc, Mutex};

        use http::{Method, Request, Response, StatusCode};
        use http_body_util::BodyExt;
        use kube::client::Body;
        use serde_json::{json, Value};

        #[derive(Debug)]
        struct Recorded {
            method: Method,
            path: String,
            body: Vec<u8>,
        }

        /// A client whose API server answers every request with `status` and `reply`.
        fn answering(
            status: StatusCode,
            reply: Value,
            timeout: Duration,
        ) -> (KubePodClient, Arc<Mutex<Vec<Recorded>>>) {
            let recorded = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&recorded);
            let service = tower::service_fn(move |req: Request<Body>| {
                let seen = Arc::clone(&seen);
                let reply = reply.clone();
                async move {
                    let (parts, body) = req.into_parts();
                    let body = body.collect().await.unwrap().to_bytes().to_vec();
                    seen.lock().unwrap().push(Recorded {
                        method: parts.method,
                        path: parts.uri.path().to_string(),
                        body,
                    });
                    let response = Response::builder()
                        .status(status)
                        .header("content-type", "application/json")
                        .body(Body::from(serde_json::to_vec(&reply).unwrap()))
                        .unwrap();
                    Ok::<_, Infallible>(response)
                }
            });
            (
                KubePodClient::new(Client::new(service, "default"), timeout),
                recorded,
            )
        }

        fn silent(timeout: Duration) -> KubePodClient {
            let service = tower::service_fn(|_req: Request<Body>| {
                std::future::pending::<std::result::Result<Response<Body>, Infallible>>()
            });
            KubePodClient::new(Client::new(service, "default"), timeout)
        }

        fn pod_json(version: &str) -> Value {
            json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "runner-1", "namespace": "ns1", "resourceVersion": version},
                "spec": {
                    "containers": [{"name": "runner", "image": "runner:latest"}],
                    "ephemeralContainers": [{"name": "debug-container", "image": "alpine"}]
                }
            })
        }

        fn status_json(code: u16, reason: &str) -> Value {
            json!({
                "apiVersion": "v1",
                "kind": "Status",
                "metadata": {},
                "status": "Failure",
                "message": format!("request failed with {reason}"),
                "reason": reason,
                "code": code
            })
        }

        #[tokio::test]
        async fn test_get_reads_named_pod() {
            let (client, recorded) =
                answering(StatusCode::OK, pod_json("41"), Duration::from_secs(5));

            let snapshot = client.get("ns1", "runner-1").await.unwrap();
            assert_eq!(snapshot.resource_version, "41");
            assert!(snapshot.contains("debug-container"));

            let recorded = recorded.lock().unwrap();
            assert_eq!(recorded.len(), 1);
            assert_eq!(recorded[0].method, Method::GET);
            assert_eq!(recorded[0].path, "/api/v1/namespaces/ns1/pods/runner-1");
        }

        #[tokio::test]
        async fn test_update_puts_subresource_with_expected_version() {
            let (client, recorded) =
                answering(StatusCode::OK, pod_json("43"), Duration::from_secs(5));
            let containers = vec![crate::container::build_container(
                crate::container::ContainerKind::Job,
                "busybox:latest",
            )];

            client
                .update("ns1", "runner-1", containers, "42")
                .await
                .unwrap();

            let recorded = recorded.lock().unwrap();
            assert_eq!(recorded.len(), 1);
            assert_eq!(recorded[0].method, Method::PUT);
            assert_eq!(
                recorded[0].path,
                "/api/v1/namespaces/ns1/pods/runner-1/ephemeralcontainers"
            );

            let body: Value = serde_json::from_slice(&recorded[0].body).unwrap();
            assert_eq!(body["metadata"]["name"], "runner-1");
            assert_eq!(body["metadata"]["namespace"], "ns1");
            assert_eq!(body["metadata"]["resourceVersion"], "42");
            assert_eq!(body["spec"]["ephemeralContainers"][0]["name"], "job-container");
            assert_eq!(
                body["spec"]["ephemeralContainers"][0]["image"],
                "busybox:latest"
            );
        }

        #[tokio::test]
        async fn test_update_conflict_status() {
            let (client, _) = answering(
                StatusCode::CONFLICT,
                status_json(409, "Conflict"),
                Duration::from_secs(5),
            );

            let err = client
                .update("ns1", "runner-1", vec![], "42")
                .await
                .unwrap_err();

            match err {
                PodmgrError::Conflict {
                    namespace,
                    name,
                    expected_version,
                } => {
                    assert_eq!(namespace, "ns1");
                    assert_eq!(name, "runner-1");
                    assert_eq!(expected_version, "42");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_get_not_found_status() {
            let (client, _) = answering(
                StatusCode::NOT_FOUND,
                status_json(404, "NotFound"),
                Duration::from_secs(5),
            );

            let err = client.get("ns1", "ghost").await.unwrap_err();
            assert!(matches!(err, PodmgrError::NotFound { ref name, .. } if name == "ghost"));
        }

        #[tokio::test]
        async fn test_unanswered_requests_hit_deadline() {
            let client = silent(Duration::from_millis(100));

            let err = client.get("ns1", "runner-1").await.unwrap_err();
            assert!(matches!(err, PodmgrError::Transient { ref operation, .. } if operation == "get"));

            let err = client
                .update("ns1", "runner-1", vec![], "42")
                .await
                .unwrap_err();
            assert!(
                matches!(err, PodmgrError::Transient { ref operation, .. } if operation == "update")
            );
            assert!(err.is_retryable());
        }
    }
}
