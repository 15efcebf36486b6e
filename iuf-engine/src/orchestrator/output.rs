//! Absorbing completed graph outputs.

use serde::Deserialize;
use serde_json::{json, Value};

use super::Orchestrator;
use crate::catalog::StageType;
use crate::errors::{IufError, ValidationError};
use crate::events::event_types;
use crate::graph::{ARG_GLOBAL_PARAMS, LABEL_SESSION, LABEL_STAGE, LABEL_STAGE_TYPE};
use crate::model::{Activity, JsonMap, Product, Session, WorkflowRef};
use crate::params::GlobalParams;
use crate::ports::{GraphStatus, TaskStatus};

/// Output parameter carrying the extraction directory of discovered products.
pub const PARENT_DIRECTORY: &str = "parent_directory";

/// Product identity carried by process-media outputs.
#[derive(Debug, Deserialize)]
struct DiscoveredProduct {
    name: String,
    version: String,
}

/// A malformed output value.
struct SkippedValue<'a> {
    task: &'a str,
    parameter: &'a str,
    reason: String,
}

impl Orchestrator {
    /// Fetches a workflow's status and absorbs its outputs once it finished.
    ///
    /// Returns `Ok(None)` while tasks are still pending or running.
    pub async fn sync_workflow(
        &self,
        session_name: &str,
        workflow: &WorkflowRef,
    ) -> Result<Option<Activity>, IufError> {
        let status = self.engine.graph_status(workflow).await?;
        if !status.is_finished() {
            tracing::debug!(session = session_name, workflow = %workflow, "Workflow still running");
            return Ok(None);
        }
        self.process_output(session_name, &status).await.map(Some)
    }

    /// Folds the outputs of a completed stage graph into the activity.
    ///
    /// Product stages record outputs per product key, recovered from each
    /// task's global parameters. The process-media stage registers the
    /// products it discovered. Other global stages record shared outputs.
    /// Malformed values are logged and skipped.
    pub async fn process_output(
        &self,
        session_name: &str,
        status: &GraphStatus,
    ) -> Result<Activity, IufError> {
        let mut session = self.get_session(session_name).await?;
        if let Some(owner) = status.label(LABEL_SESSION) {
            if owner != session.name {
                return Err(ValidationError::new(format!(
                    "Workflow belongs to session '{owner}', not '{}'",
                    session.name
                ))
                .with_field(LABEL_SESSION)
                .into());
            }
        }

        let stage = status
            .label(LABEL_STAGE)
            .ok_or_else(|| ValidationError::new("Workflow has no stage label").with_field(LABEL_STAGE))?
            .to_string();
        let stage_type = match status.label(LABEL_STAGE_TYPE) {
            Some("product") => StageType::Product,
            Some("global") => StageType::Global,
            other => {
                return Err(IufError::InvalidStageType {
                    stage,
                    stage_type: other.unwrap_or_default().to_string(),
                })
            }
        };

        let mut activity = self.get_activity(&session.activity_ref).await?;
        let mut skipped = Vec::new();
        let mut products_changed = false;

        match stage_type {
            StageType::Product => {
                absorb_product_outputs(&mut activity, &stage, &status.nodes, &mut skipped);
            }
            StageType::Global if stage == self.config.process_media_stage => {
                products_changed = absorb_discovered_products(
                    &mut activity,
                    &mut session,
                    &stage,
                    &status.nodes,
                    &mut skipped,
                );
            }
            StageType::Global => {
                for node in status.nodes.iter().filter(|n| !n.outputs.is_empty()) {
                    activity
                        .operation_outputs
                        .global_stage_mut(&stage)
                        .merge(operation_values(node));
                }
            }
        }

        for value in &skipped {
            tracing::warn!(
                session = %session.name,
                stage = %stage,
                task = value.task,
                parameter = value.parameter,
                reason = %value.reason,
                "Skipping malformed output value"
            );
            self.events
                .emit(
                    event_types::OUTPUT_VALUE_SKIPPED,
                    json!({
                        "session": session.name,
                        "stage": stage,
                        "task": value.task,
                        "parameter": value.parameter,
                        "reason": value.reason,
                    }),
                )
                .await;
        }

        let activity = self.stores.activities.update(activity).await?;
        if products_changed {
            self.stores.sessions.update(session).await?;
        }

        tracing::info!(
            activity = %activity.name,
            session = session_name,
            stage = %stage,
            skipped = skipped.len(),
            "Processed stage outputs"
        );
        Ok(activity)
    }
}

/// `{<operation>: {<param>: <value>}}` for one task.
fn operation_values(node: &TaskStatus) -> JsonMap {
    let params: JsonMap = node
        .outputs
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let operation = node.template_name.as_deref().unwrap_or(&node.name);
    JsonMap::from_iter([(operation.to_string(), Value::Object(params))])
}

fn absorb_product_outputs<'a>(
    activity: &mut Activity,
    stage: &str,
    nodes: &'a [TaskStatus],
    skipped: &mut Vec<SkippedValue<'a>>,
) {
    for node in nodes.iter().filter(|n| !n.outputs.is_empty()) {
        let key = node
            .inputs
            .get(ARG_GLOBAL_PARAMS)
            .ok_or_else(|| "task has no global parameters input".to_string())
            .and_then(|raw| serde_json::from_str::<GlobalParams>(raw).map_err(|e| e.to_string()))
            .and_then(|params| {
                params
                    .product_key()
                    .ok_or_else(|| "global parameters name no product".to_string())
            });

        match key {
            Ok(key) => activity
                .operation_outputs
                .product_stage_mut(stage)
                .merge_product(&key, operation_values(node)),
            Err(reason) => skipped.push(SkippedValue {
                task: &node.name,
                parameter: ARG_GLOBAL_PARAMS,
                reason,
            }),
        }
    }
}

/// Registers every product described by a process-media task.
///
/// Returns true if any product was added or replaced.
fn absorb_discovered_products<'a>(
    activity: &mut Activity,
    session: &mut Session,
    stage: &str,
    nodes: &'a [TaskStatus],
    skipped: &mut Vec<SkippedValue<'a>>,
) -> bool {
    let mut changed = false;
    for node in nodes {
        let descriptors = node
            .outputs
            .iter()
            .filter(|(param, _)| param.as_str() != PARENT_DIRECTORY);
        let Some(parent) = node.outputs.get(PARENT_DIRECTORY) else {
            for (param, _) in descriptors {
                skipped.push(SkippedValue {
                    task: &node.name,
                    parameter: param,
                    reason: format!("missing sibling '{PARENT_DIRECTORY}'"),
                });
            }
            continue;
        };

        for (param, raw) in descriptors {
            let discovered = match serde_yaml::from_str::<DiscoveredProduct>(raw) {
                Ok(discovered) => discovered,
                Err(e) => {
                    skipped.push(SkippedValue {
                        task: &node.name,
                        parameter: param,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let product = Product::new(discovered.name, discovered.version)
                .with_location(parent.clone())
                .with_manifest(raw.clone());
            let key = product.key();
            tracing::info!(product = %key, location = %parent, "Discovered product");

            activity
                .operation_outputs
                .product_stage_mut(stage)
                .merge_product(
                    &key,
                    JsonMap::from_iter([(PARENT_DIRECTORY.to_string(), json!(parent))]),
                );
            upsert_session_product(session, product.clone());
            activity.upsert_product(product);
            changed = true;
        }
    }
    changed
}

fn upsert_session_product(session: &mut Session, product: Product) {
    match session
        .products
        .iter_mut()
        .find(|p| p.name == product.name && p.version == product.version)
    {
        Some(existing) => *existing = product,
        None => session.products.push(product),
    }
}
