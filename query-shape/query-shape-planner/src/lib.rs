#![forbid(unsafe_code)]

//! Compiles hierarchical expand/select requests into composable query shapes.

pub mod capabilities;
pub mod config;
pub mod continuation;
pub mod expand_tree;
pub mod metadata_cache;
pub mod plan_error;
pub mod projection;
pub mod wrapper;

mod assemble;
mod planner;

pub use capabilities::{Capabilities, TypeDispatchStrategy};
pub use config::PlannerConfig;
pub use metadata_cache::MetadataCache;
pub use plan_error::{ErrorClass, PlanError, PlanResult};
pub use planner::{Planner, QueryPlan};
