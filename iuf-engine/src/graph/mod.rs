//! Task graphs.
//!
//! A stage compiles into one [`TaskGraph`]. Product stages emit one chain
//! per product:
//!
//! ```text
//! [pre-hook] -> op1 -> op2 -> ... -> [post-hook]
//! ```
//!
//! Global stages emit every product's pre-hook, then each operation once
//! depending on the whole previous round, then every post-hook:
//!
//! ```text
//! pre(a) pre(b)
//!     \   /
//!      op1
//!       |
//!      op2
//!     /   \
//! post(a) post(b)
//! ```

mod generator;
mod naming;
mod task;

pub use generator::{GeneratedGraph, GraphGenerator, HookTaskSpec};
pub use naming::{
    hook_task_name, operation_task_name, resolve_script_path, sanitize_task_name,
    MIN_TASK_NAME_LEN,
};
pub use task::{
    Task, TaskGraph, TemplateRef, ARG_AUTH_TOKEN, ARG_GLOBAL_PARAMS, ARG_SCRIPT_PATH,
    LABEL_ACTIVITY, LABEL_SESSION, LABEL_STAGE, LABEL_STAGE_TYPE,
};
