//! Releaser configuration.

use std::time::Duration;

/// Job metadata key holding the public URL of a release.
pub const RELEASE_URL_META_KEY: &str = "deckhand/release-url";

/// The deployment being released, as named by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRef {
    /// Scheduler job name.
    pub name: String,
}

impl DeploymentRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// What the operator asked the releaser to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaserConfig {
    /// Only consider these task groups. Empty means every canary group.
    pub groups: Vec<String>,
    /// Fail the deployment instead of promoting it.
    pub fail_deployment: bool,
    /// Override the health deadline otherwise derived from the job.
    pub health_deadline: Option<Duration>,
}
