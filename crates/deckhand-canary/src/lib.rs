//! deckhand-canary: promote or fail a scheduler canary deployment.
//!
//! # Components
//!
//! - **`config`**: [`ReleaserConfig`] and the target [`DeploymentRef`]
//! - **`decision`**: [`CanaryDecision`], which groups qualify
//! - **`promoter`**: [`CanaryPromoter`], the bounded release state machine
//!
//! Convergence of the evaluation created by the promote/fail call is
//! delegated to `deckhand_monitor::EvaluationMonitor`.

pub mod config;
pub mod decision;
pub mod promoter;

pub use config::{DeploymentRef, RELEASE_URL_META_KEY, ReleaserConfig};
pub use decision::CanaryDecision;
pub use promoter::{CanaryPromoter, ReleaseOutcome, ReleaseResult, SkipReason};
