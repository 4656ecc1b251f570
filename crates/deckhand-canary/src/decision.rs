//! Which groups a release acts on.

use std::collections::BTreeSet;

use deckhand_scheduler::Deployment;

use crate::config::ReleaserConfig;

/// The promote-or-fail decision for one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanaryDecision {
    pub groups_to_promote: BTreeSet<String>,
    pub fail_deployment: bool,
}

impl CanaryDecision {
    /// A group qualifies when it wants canaries and, if a filter is
    /// configured, is named in it.
    pub fn compute(config: &ReleaserConfig, deployment: &Deployment) -> Self {
        let groups_to_promote = deployment
            .task_groups
            .iter()
            .filter(|(_, state)| state.desired_canaries > 0)
            .filter(|(name, _)| config.groups.is_empty() || config.groups.contains(name))
            .map(|(name, _)| name.clone())
            .collect();

        Self {
            groups_to_promote,
            fail_deployment: config.fail_deployment,
        }
    }

    /// No group has canaries to act on.
    pub fn is_empty(&self) -> bool {
        self.groups_to_promote.is_empty()
    }

    pub fn groups(&self) -> Vec<String> {
        self.groups_to_promote.iter().cloned().collect()
    }
}
