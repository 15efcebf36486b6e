//! Stage progression.

use serde::Serialize;
use serde_json::json;

use super::Orchestrator;
use crate::errors::IufError;
use crate::events::event_types;
use crate::graph::GeneratedGraph;
use crate::model::{ActivityState, Session, SessionState, WorkflowRef};

/// Result of [`Orchestrator::run_next_stage`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRunResponse {
    /// The session as persisted after the call.
    pub session: Session,
    /// The submitted graph, if a stage was started.
    pub workflow: Option<WorkflowRef>,
    /// True once every stage has run.
    pub completed: bool,
    /// Stages passed over because they had no work.
    pub skipped: Vec<String>,
    /// True if the current stage was missing from the stage list and
    /// progression started over from the first stage.
    pub restarted: bool,
}

/// Where progression continues from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextStage {
    At(usize),
    Restart,
    Exhausted,
}

fn next_stage(stages: &[String], current: &str) -> NextStage {
    if stages.is_empty() {
        return NextStage::Exhausted;
    }
    if current.is_empty() {
        return NextStage::At(0);
    }
    match stages.iter().position(|s| s == current) {
        Some(i) if i + 1 < stages.len() => NextStage::At(i + 1),
        Some(_) => NextStage::Exhausted,
        None => NextStage::Restart,
    }
}

impl Orchestrator {
    /// Advances a session to its next stage.
    ///
    /// Stages without work are skipped within the same call. The first stage
    /// with work is compiled and submitted; if none is left the session is
    /// completed. A completed session cannot be advanced again.
    pub async fn run_next_stage(&self, session_name: &str) -> Result<StageRunResponse, IufError> {
        let mut session = self.get_session(session_name).await?;
        if session.is_completed() {
            return Err(IufError::SessionFinished {
                session: session.name,
                state: session.current_state,
            });
        }
        let activity = self.get_activity(&session.activity_ref).await?;
        let stages = session.input_parameters.stages.clone();

        let mut restarted = false;
        let mut index = match next_stage(&stages, &session.current_stage) {
            NextStage::At(i) => i,
            NextStage::Restart => {
                tracing::warn!(
                    session = %session.name,
                    stage = %session.current_stage,
                    "Current stage is not in the stage list; restarting from the first stage"
                );
                self.events
                    .emit(
                        event_types::SESSION_RESTARTED,
                        json!({
                            "activity": session.activity_ref,
                            "session": session.name,
                            "previous_stage": session.current_stage,
                        }),
                    )
                    .await;
                restarted = true;
                0
            }
            NextStage::Exhausted => stages.len(),
        };

        let generator = self.generator();
        let mut skipped = Vec::new();
        while let Some(stage) = stages.get(index) {
            session.current_stage.clone_from(stage);
            let generated = generator
                .generate_stage_graph(&session, &activity.operation_outputs)
                .await?;
            match generated {
                GeneratedGraph::Skip => {
                    self.events
                        .emit(
                            event_types::STAGE_SKIPPED,
                            json!({
                                "activity": session.activity_ref,
                                "session": session.name,
                                "stage": stage,
                            }),
                        )
                        .await;
                    skipped.push(stage.clone());
                    index += 1;
                }
                GeneratedGraph::Submit(graph) => {
                    let tasks = graph.len();
                    let workflow = self.engine.submit_graph(graph).await?;
                    session.workflows.push(workflow.clone());
                    session.current_state = SessionState::InProgress;
                    let session = self.stores.sessions.update(session).await?;

                    self.sync_activity_state(
                        &session.activity_ref,
                        &session.name,
                        ActivityState::WaitForAdmin,
                        ActivityState::InProgress,
                    )
                    .await?;

                    tracing::info!(
                        activity = %session.activity_ref,
                        session = %session.name,
                        stage = %stage,
                        workflow = %workflow,
                        tasks,
                        "Submitted stage"
                    );
                    self.events
                        .emit(
                            event_types::STAGE_SUBMITTED,
                            json!({
                                "activity": session.activity_ref,
                                "session": session.name,
                                "stage": stage,
                                "workflow": workflow,
                                "tasks": tasks,
                            }),
                        )
                        .await;

                    return Ok(StageRunResponse {
                        session,
                        workflow: Some(workflow),
                        completed: false,
                        skipped,
                        restarted,
                    });
                }
            }
        }

        self.complete_session(session, skipped, restarted).await
    }

    async fn complete_session(
        &self,
        mut session: Session,
        skipped: Vec<String>,
        restarted: bool,
    ) -> Result<StageRunResponse, IufError> {
        session.current_state = SessionState::Completed;
        let session = self.stores.sessions.update(session).await?;

        self.sync_activity_state(
            &session.activity_ref,
            &session.name,
            ActivityState::InProgress,
            ActivityState::WaitForAdmin,
        )
        .await?;

        tracing::info!(
            activity = %session.activity_ref,
            session = %session.name,
            "Session completed"
        );
        self.events
            .emit(
                event_types::SESSION_COMPLETED,
                json!({"activity": session.activity_ref, "session": session.name}),
            )
            .await;

        Ok(StageRunResponse {
            session,
            workflow: None,
            completed: true,
            skipped,
            restarted,
        })
    }
}
