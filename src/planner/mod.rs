//! Planning and applying changes.
//!
//! The [`Planner`] compares the configuration with an observed
//! [`DeploymentState`](crate::state::DeploymentState) and produces an ordered
//! [`Plan`]. The [`Executor`] applies a plan against servers and providers.

mod diff;
mod executor;
mod handlers;
mod plan;
mod scope;

pub use diff::Planner;
pub use executor::{ApplyReport, CancelToken, ChangeResult, Executor};
pub use plan::{Change, ChangeType, EntityKind, EntityState, Plan, PlanSummary};
pub use scope::{Scope, ScopeTarget};
