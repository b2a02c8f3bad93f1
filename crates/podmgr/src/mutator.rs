//! # Pod Container Mutator
//!
//! Read-modify-write of a pod's ephemeral container list:
//!
//! 1. fetch the pod and its resource version
//! 2. return early if the target container is already attached
//! 3. build the container descriptor
//! 4. submit snapshot list + new container, conditional on the fetched version
//!
//! Nothing is retried here. A [`PodmgrError::Conflict`] or
//! [`PodmgrError::Transient`] means the caller may re-run [`PodContainerMutator::ensure`]
//! from the start; the presence check makes that safe.

use tracing::{debug, info, instrument};

use crate::client::{AttachedContainer, PodClient};
use crate::config::resolve_namespace;
use crate::container::{build_container, validate_image, ContainerKind};
use crate::error::{PodmgrError, Result};

/// Target of a mutation. `namespace` defaults to `"default"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub namespace: Option<String>,
    pub pod: String,
    pub kind: ContainerKind,
    pub image: String,
}

impl MutationRequest {
    pub fn new(pod: impl Into<String>, kind: ContainerKind, image: impl Into<String>) -> Self {
        Self {
            namespace: None,
            pod: pod.into(),
            kind,
            image: image.into(),
        }
    }

    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        resolve_namespace(self.namespace.as_deref())
    }
}

/// What [`PodContainerMutator::ensure`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The container was appended; the pod moved past `previous_version`.
    Created { previous_version: String },
    /// The container was already attached; no update was issued.
    AlreadyPresent,
}

/// Applies ensure semantics to a pod's ephemeral containers. Removal needs no
/// client and lives in the free function [`remove`].
pub struct PodContainerMutator<'a, C: PodClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: PodClient + ?Sized> PodContainerMutator<'a, C> {
    #[must_use]
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Make sure the container for `request.kind` is attached to the pod.
    ///
    /// # Errors
    ///
    /// - [`PodmgrError::Validation`] for an empty pod name or bad image,
    ///   before any cluster call
    /// - [`PodmgrError::NotFound`] if the pod does not exist
    /// - [`PodmgrError::Conflict`] if the pod changed since it was fetched
    /// - [`PodmgrError::Transient`] on network failures or deadline expiry
    #[instrument(
        skip(self, request),
        fields(namespace = %request.namespace(), pod = %request.pod, container = %request.kind)
    )]
    pub async fn ensure(&self, request: &MutationRequest) -> Result<EnsureOutcome> {
        validate_pod_name(&request.pod)?;
        validate_image(&request.image)?;

        let namespace = request.namespace();
        let name = request.kind.container_name();

        debug!("Fetching pod");
        let snapshot = self.client.get(namespace, &request.pod).await?;

        if snapshot.contains(name) {
            info!(
                resource_version = %snapshot.resource_version,
                "Container already attached, nothing to do"
            );
            return Ok(EnsureOutcome::AlreadyPresent);
        }

        debug!(image = %request.image, "Building container spec");
        let container = build_container(request.kind, &request.image);

        let mut containers = snapshot.containers;
        containers.push(container);

        debug!(
            resource_version = %snapshot.resource_version,
            ephemeral_containers = containers.len(),
            "Submitting ephemeral container update"
        );
        self.client
            .update(
                namespace,
                &request.pod,
                containers,
                &snapshot.resource_version,
            )
            .await?;

        info!(image = %request.image, "Attached container");
        Ok(EnsureOutcome::Created {
            previous_version: snapshot.resource_version,
        })
    }

    /// List the ephemeral containers attached to the pod.
    ///
    /// # Errors
    ///
    /// Same fetch errors as [`ensure`](Self::ensure).
    #[instrument(skip(self))]
    pub async fn inspect(
        &self,
        namespace: Option<&str>,
        pod: &str,
    ) -> Result<Vec<AttachedContainer>> {
        validate_pod_name(pod)?;
        let snapshot = self.client.get(resolve_namespace(namespace), pod).await?;
        Ok(snapshot.attached())
    }
}

/// Ephemeral containers cannot be removed from a live pod; the API has no
/// such operation. This returns success without contacting the cluster and
/// without changing anything. Getting rid of the container means recreating
/// the pod.
///
/// # Errors
///
/// Never fails.
pub fn remove(namespace: Option<&str>, pod: &str, kind: ContainerKind) -> Result<()> {
    debug!(
        namespace = %resolve_namespace(namespace),
        pod = %pod,
        container = %kind,
        "Ephemeral containers cannot be removed from a running pod; skipping"
    );
    Ok(())
}

fn validate_pod_name(pod: &str) -> Result<()> {
    if pod.trim().is_empty() {
        return Err(PodmgrError::Validation(
            "pod name must not be empty".to_string(),
        ));
    }
    Ok(())
}
