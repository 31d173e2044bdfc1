//! Build planning and environment provisioning
//!
//! The planner decides reuse or rebuild per cell from the ledger; the
//! provisioner carries the decision out against the container engine.

pub mod planner;
pub mod provisioner;
pub mod recipe;

pub use planner::{decide, BuildAction, BuildDecision, BuildPlanner, DecisionReason};
pub use provisioner::{ProvisionOutcome, ProvisionStatus, Provisioner, RetryPolicy};
pub use recipe::{BuildRecipe, RecipeSource};
