//! # Auxiliary Container Specs
//!
//! Pure mapping from a [`ContainerKind`] and an image reference to a fully
//! populated ephemeral container descriptor.
//!
//! | kind    | name              | stdin | tty   |
//! |---------|-------------------|-------|-------|
//! | `job`   | `job-container`   | false | false |
//! | `debug` | `debug-container` | true  | true  |
//!
//! Both kinds pull `IfNotPresent`, report termination messages from `File`,
//! and mount the runner's `work-dir` volume at `/actions-runner/_work`.

use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::{EphemeralContainer, VolumeMount};
use serde::{Deserialize, Serialize};

use crate::error::PodmgrError;

/// Image pull policy applied to every auxiliary container.
pub const IMAGE_PULL_POLICY: &str = "IfNotPresent";

/// Termination message policy applied to every auxiliary container.
pub const TERMINATION_MESSAGE_POLICY: &str = "File";

/// Name of the runner pod volume shared with auxiliary containers.
pub const WORK_VOLUME_NAME: &str = "work-dir";

/// Mount path of the shared work volume inside auxiliary containers.
pub const WORK_VOLUME_MOUNT_PATH: &str = "/actions-runner/_work";

/// The closed set of auxiliary containers this tool knows how to attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum ContainerKind {
    /// Non-interactive task executor.
    #[serde(rename = "job-container")]
    #[value(name = "job-container")]
    Job,
    /// Interactive shell with stdin and a TTY.
    #[serde(rename = "debug-container")]
    #[value(name = "debug-container")]
    Debug,
}

impl ContainerKind {
    /// Canonical container name, unique within a pod's ephemeral list.
    #[must_use]
    pub const fn container_name(self) -> &'static str {
        match self {
            Self::Job => "job-container",
            Self::Debug => "debug-container",
        }
    }

    /// Whether the container keeps stdin open and allocates a TTY.
    #[must_use]
    pub const fn is_interactive(self) -> bool {
        matches!(self, Self::Debug)
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.container_name())
    }
}

impl FromStr for ContainerKind {
    type Err = PodmgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job-container" => Ok(Self::Job),
            "debug-container" => Ok(Self::Debug),
            other => Err(PodmgrError::Validation(format!(
                "unknown container kind '{other}'. Use: job-container, debug-container"
            ))),
        }
    }
}

/// Build the ephemeral container descriptor for `kind` running `image`.
///
/// Total and side-effect free.
#[must_use]
pub fn build_container(kind: ContainerKind, image: &str) -> EphemeralContainer {
    let interactive = kind.is_interactive();

    EphemeralContainer {
        name: kind.container_name().to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some(IMAGE_PULL_POLICY.to_string()),
        termination_message_policy: Some(TERMINATION_MESSAGE_POLICY.to_string()),
        stdin: Some(interactive),
        tty: Some(interactive),
        volume_mounts: Some(vec![VolumeMount {
            name: WORK_VOLUME_NAME.to_string(),
            mount_path: WORK_VOLUME_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Reject image references the API server would refuse anyway.
///
/// # Errors
///
/// Returns [`PodmgrError::Validation`] when the reference is empty or
/// contains whitespace.
pub fn validate_image(image: &str) -> Result<(), PodmgrError> {
    if image.trim().is_empty() {
        return Err(PodmgrError::Validation(
            "image reference must not be empty".to_string(),
        ));
    }
    if image.chars().any(char::is_whitespace) {
        return Err(PodmgrError::Validation(format!(
            "image reference '{image}' must not contain whitespace"
        )));
    }
    Ok(())
}
