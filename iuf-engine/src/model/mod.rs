//! Persistent domain records.
//!
//! This module contains the records the engine reads and writes:
//! - Activities with their parameters, products and accumulated outputs
//! - Sessions, the per-run snapshots of an activity
//! - History entries
//! - Typed stage outputs

mod activity;
mod history;
mod outputs;
mod session;

pub(crate) use activity::empty_state_as_none;
pub use activity::{
    product_key, Activity, ActivityState, InputParameters, JsonMap, ManagedRolloutStrategy,
    Product, SiteParameters,
};
pub use history::{history_name, History};
pub use outputs::{
    deep_merge, merge_maps, GlobalStageOutput, OperationOutputs, ProductStageOutput,
    StageOutputRecord,
};
pub use session::{Session, SessionState, WorkflowRef};
