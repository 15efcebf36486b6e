//! The orchestration service.
//!
//! [`Orchestrator`] owns no state between calls. Every operation reads the
//! records it needs from the injected stores, computes, and writes back.
//! Concurrent writers are detected through `resource_version` and surface
//! as `Conflict` errors.

mod deletion;
mod history;
mod output;
mod patch;
mod progression;

pub use deletion::{RecordDeleter, ResourceDeleter, WorkflowDeleter};
pub use output::PARENT_DIRECTORY;
pub use patch::{check_transition, ActivityPatch, InputParametersPatch};
pub use progression::StageRunResponse;

use std::sync::Arc;

use crate::catalog::StagesCatalog;
use crate::config::EngineConfig;
use crate::errors::{CollaboratorError, IufError, NotFoundError, ValidationError};
use crate::events::{EventSink, NoOpEventSink};
use crate::graph::GraphGenerator;
use crate::model::{Activity, ActivityState, Session};
use crate::ports::{ExecutionEngine, TokenIssuer};
use crate::store::{Record, Selector, Stores};
use crate::utils::generate_session_name;

/// Drives activities and sessions through their stages.
pub struct Orchestrator {
    stores: Stores,
    engine: Arc<dyn ExecutionEngine>,
    tokens: Arc<dyn TokenIssuer>,
    catalog: Arc<StagesCatalog>,
    events: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("stages", &self.catalog.stages.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with default configuration and no event sink.
    #[must_use]
    pub fn new(
        stores: Stores,
        engine: Arc<dyn ExecutionEngine>,
        tokens: Arc<dyn TokenIssuer>,
        catalog: Arc<StagesCatalog>,
    ) -> Self {
        Self {
            stores,
            engine,
            tokens,
            catalog,
            events: Arc::new(NoOpEventSink),
            config: EngineConfig::default(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the stages catalog.
    #[must_use]
    pub fn catalog(&self) -> &StagesCatalog {
        &self.catalog
    }

    /// Persists a new activity and records its creation in history.
    pub async fn create_activity(&self, mut activity: Activity) -> Result<Activity, IufError> {
        if activity.name.trim().is_empty() {
            return Err(ValidationError::new("Activity name must not be empty")
                .with_field("name")
                .into());
        }
        self.catalog
            .validate_stage_list(&activity.input_parameters.stages)?;

        activity.activity_state = ActivityState::WaitForAdmin;
        let activity = self.stores.activities.create(activity).await?;
        self.record_history(&activity.name, activity.activity_state, "", "Activity created")
            .await?;

        tracing::info!(activity = %activity.name, "Created activity");
        Ok(activity)
    }

    /// Reads an activity.
    pub async fn get_activity(&self, name: &str) -> Result<Activity, IufError> {
        self.stores
            .activities
            .get(name)
            .await
            .map_err(|e| not_found_as::<Activity>(e, name))
    }

    /// Lists every activity.
    pub async fn list_activities(&self) -> Result<Vec<Activity>, IufError> {
        Ok(self.stores.activities.list(&Selector::new()).await?)
    }

    /// Starts a new session snapshotting the activity's parameters.
    pub async fn create_session(&self, activity: &str) -> Result<Session, IufError> {
        let activity = self.get_activity(activity).await?;
        let session = Session::from_activity(generate_session_name(&activity.name), &activity);
        let session = self.stores.sessions.create(session).await?;

        tracing::info!(activity = %activity.name, session = %session.name, "Created session");
        Ok(session)
    }

    /// Reads a session.
    pub async fn get_session(&self, name: &str) -> Result<Session, IufError> {
        self.stores
            .sessions
            .get(name)
            .await
            .map_err(|e| not_found_as::<Session>(e, name))
    }

    /// Lists the sessions of an activity.
    pub async fn list_sessions(&self, activity: &str) -> Result<Vec<Session>, IufError> {
        Ok(self.stores.sessions.list(&Selector::activity(activity)).await?)
    }

    fn generator(&self) -> GraphGenerator<'_> {
        GraphGenerator::new(
            self.engine.as_ref(),
            self.tokens.as_ref(),
            &self.catalog,
            &self.config,
        )
    }
}

fn not_found_as<R: Record>(err: CollaboratorError, name: &str) -> IufError {
    if err.is_not_found() {
        NotFoundError::new(R::KIND, name).into()
    } else {
        err.into()
    }
}
