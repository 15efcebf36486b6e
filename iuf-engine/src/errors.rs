//! Error types for the orchestration engine.
//!
//! Errors fall into three families: validation errors caused by admin input,
//! not-found errors for missing records, and collaborator errors raised by the
//! store, the execution engine or the token issuer. [`IufError`] wraps all of
//! them and knows which HTTP-equivalent status each one maps to.

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::{ActivityState, SessionState};

/// The main error type for engine operations.
#[derive(Debug, Error)]
pub enum IufError {
    /// Admin input was rejected.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A record does not exist.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// A collaborator (store, engine, token issuer) failed.
    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),

    /// A hook script escapes its product directory.
    #[error("{0}")]
    PathTraversal(#[from] PathTraversalError),

    /// A generated task graph is malformed.
    #[error("{0}")]
    InvalidGraph(#[from] GraphValidationError),

    /// The session has no current stage to compile.
    #[error("Session '{session}' has no current stage")]
    NoCurrentStage {
        /// The session name.
        session: String,
    },

    /// The stage is not part of the stages catalog.
    #[error("Stage '{stage}' is not defined in the stages catalog")]
    UnknownStage {
        /// The stage name.
        stage: String,
    },

    /// The requested activity state change is not allowed.
    #[error("Illegal activity state transition from '{from}' to '{to}'")]
    IllegalTransition {
        /// The current state.
        from: ActivityState,
        /// The requested state.
        to: ActivityState,
    },

    /// A completed graph carried an unrecognized `stage_type` label.
    #[error("Invalid stage type '{stage_type}' on workflow for stage '{stage}'")]
    InvalidStageType {
        /// The stage label.
        stage: String,
        /// The offending label value.
        stage_type: String,
    },

    /// The session is already completed and cannot run again.
    #[error("Session '{session}' is {state}; create a new session to run again")]
    SessionFinished {
        /// The session name.
        session: String,
        /// The terminal state.
        state: SessionState,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl IufError {
    /// Returns the HTTP-equivalent status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_)
            | Self::NoCurrentStage { .. }
            | Self::UnknownStage { .. }
            | Self::IllegalTransition { .. }
            | Self::SessionFinished { .. } => 400,
            Self::NotFound(_) | Self::Collaborator(CollaboratorError::NotFound { .. }) => 404,
            Self::Collaborator(CollaboratorError::Conflict { .. }) => 409,
            Self::Collaborator(_)
            | Self::PathTraversal(_)
            | Self::InvalidGraph(_)
            | Self::InvalidStageType { .. }
            | Self::Serialization(_) => 500,
        }
    }

    /// Converts to a dictionary representation suitable for a response body.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("status".to_string(), serde_json::json!(self.status_code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

impl From<serde_json::Error> for IufError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for IufError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error raised when admin input is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// The field the error refers to, if any.
    pub field: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Sets the offending field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Error raised when a record is missing.
#[derive(Debug, Clone, Error)]
#[error("{kind} '{name}' not found")]
pub struct NotFoundError {
    /// The record kind.
    pub kind: &'static str,
    /// The record name.
    pub name: String,
}

impl NotFoundError {
    /// Creates a new not-found error.
    #[must_use]
    pub fn new(kind: &'static str, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Errors returned by external collaborators.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// The requested object does not exist.
    #[error("{collaborator}: '{name}' not found")]
    NotFound {
        /// Which collaborator failed.
        collaborator: &'static str,
        /// The object name.
        name: String,
    },

    /// A write lost a race or collided with an existing object.
    #[error("{collaborator}: conflict on '{name}': {message}")]
    Conflict {
        /// Which collaborator failed.
        collaborator: &'static str,
        /// The object name.
        name: String,
        /// Additional detail.
        message: String,
    },

    /// A transient failure that may succeed on retry.
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        /// Which collaborator failed.
        collaborator: &'static str,
        /// Additional detail.
        message: String,
    },

    /// A permanent failure.
    #[error("{collaborator} failed: {message}")]
    Failed {
        /// Which collaborator failed.
        collaborator: &'static str,
        /// Additional detail.
        message: String,
    },
}

impl CollaboratorError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(collaborator: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            collaborator,
            name: name.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(
        collaborator: &'static str,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            collaborator,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a transient error.
    #[must_use]
    pub fn unavailable(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator,
            message: message.into(),
        }
    }

    /// Creates a permanent error.
    #[must_use]
    pub fn failed(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            collaborator,
            message: message.into(),
        }
    }

    /// Returns true if the object was missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if a write collided with another writer.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true if the call may succeed when repeated.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Error raised when a hook script resolves outside its product directory.
#[derive(Debug, Clone, Error)]
#[error("Hook script '{script_path}' for product '{product}' resolves to '{}', outside '{}'", resolved.display(), root.display())]
pub struct PathTraversalError {
    /// The product key.
    pub product: String,
    /// The manifest-declared path.
    pub script_path: String,
    /// The cleaned, joined path.
    pub resolved: PathBuf,
    /// The product's extraction directory.
    pub root: PathBuf,
}

/// Error raised when a task graph fails structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphValidationError {
    /// Two tasks share a name.
    #[error("Task '{0}' is defined more than once")]
    DuplicateTask(String),

    /// A task depends on a task that is not in the graph.
    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        /// The dependent task.
        task: String,
        /// The missing dependency.
        dependency: String,
    },

    /// The dependencies form a cycle.
    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// Convenience alias for engine results.
pub type Result<T, E = IufError> = std::result::Result<T, E>;
