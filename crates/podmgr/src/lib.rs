//! Attach job and debug containers to a running runner pod.
//!
//! CI runner pods need an extra process on demand: a task executor, or an
//! interactive shell for debugging. Kubernetes ephemeral containers provide
//! that without redeploying the pod. This crate fetches the pod, checks
//! whether the wanted container is already attached, builds the container
//! spec, and submits a version-checked update of the pod's
//! `ephemeralcontainers` subresource.
//!
//! # Usage
//!
//! ```no_run
//! use podmgr::{ClusterConnector, ConnectorConfig, ContainerKind, MutationRequest, PodContainerMutator};
//!
//! # async fn example() -> podmgr::Result<()> {
//! let client = ClusterConnector::new(ConnectorConfig::default()).connect().await?;
//! let mutator = PodContainerMutator::new(&client);
//!
//! let request = MutationRequest::new("runner-123", ContainerKind::Job, "busybox:latest");
//! mutator.ensure(&request).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! Concurrent invocations against the same pod are serialised by the API
//! server's resource version check. A losing writer gets
//! [`PodmgrError::Conflict`]; re-running [`PodContainerMutator::ensure`]
//! re-reads the pod and either finds the container or retries the append.
//!
//! Ephemeral containers cannot be removed once attached.
//! [`PodContainerMutator::remove`] succeeds without doing anything.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod client;
pub mod config;
pub mod connector;
pub mod container;
pub mod error;
pub mod mutator;
pub mod telemetry;

pub use client::{AttachedContainer, KubePodClient, PodClient, PodSnapshot};
pub use config::{ConnectorConfig, DEFAULT_NAMESPACE};
pub use connector::{ClusterConnector, CredentialSource};
pub use container::{build_container, ContainerKind};
pub use error::{PodmgrError, Result};
pub use mutator::{EnsureOutcome, MutationRequest, PodContainerMutator};
