//! # IUF Engine
//!
//! Stage orchestration for install/upgrade activities on a management
//! cluster.
//!
//! An admin declares an [`Activity`](model::Activity): the products to
//! install and an ordered list of stages. Each [`Session`](model::Session)
//! walks that list. For every stage the engine:
//!
//! - **Compiles** the stage into a task graph of operation and hook tasks
//! - **Parameterizes** every task with a global parameters blob built from
//!   manifests, input and site parameters, and earlier stage outputs
//! - **Submits** the graph to an external execution engine
//! - **Absorbs** the graph's outputs once it completes
//!
//! Storage, the execution engine and token issuance are collaborators
//! injected through the traits in [`store`] and [`ports`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use iuf_engine::prelude::*;
//!
//! let orchestrator = Orchestrator::new(stores, engine, tokens, Arc::new(catalog));
//!
//! orchestrator.create_activity(activity).await?;
//! let session = orchestrator.create_session("install-2024").await?;
//! let response = orchestrator.run_next_stage(&session.name).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod catalog;
pub mod config;
pub mod errors;
pub mod events;
pub mod graph;
pub mod manifest;
pub mod model;
pub mod observability;
pub mod orchestrator;
pub mod params;
pub mod ports;
pub mod retry;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::catalog::{Operation, Stage, StageType, StagesCatalog};
    pub use crate::config::EngineConfig;
    pub use crate::errors::{
        CollaboratorError, IufError, NotFoundError, PathTraversalError, ValidationError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::graph::{GeneratedGraph, GraphGenerator, Task, TaskGraph};
    pub use crate::model::{
        Activity, ActivityState, History, InputParameters, OperationOutputs, Product, Session,
        SessionState, SiteParameters, WorkflowRef,
    };
    pub use crate::orchestrator::{ActivityPatch, InputParametersPatch, Orchestrator, StageRunResponse};
    pub use crate::ports::{ExecutionEngine, GraphStatus, TaskPhase, TaskStatus, TokenIssuer};
    pub use crate::retry::RetryConfig;
    pub use crate::store::{InMemoryStore, Record, RecordStore, Selector, Stores};
}
