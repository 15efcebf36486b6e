//! Stage graph compilation.

use std::collections::{BTreeMap, HashSet};

use super::naming::{hook_task_name, operation_task_name, resolve_script_path, sanitize_task_name};
use super::task::{
    Task, TaskGraph, ARG_AUTH_TOKEN, ARG_GLOBAL_PARAMS, ARG_SCRIPT_PATH, LABEL_ACTIVITY,
    LABEL_SESSION, LABEL_STAGE, LABEL_STAGE_TYPE,
};
use crate::catalog::{Operation, Stage, StageType, StagesCatalog};
use crate::config::EngineConfig;
use crate::errors::{IufError, ValidationError};
use crate::manifest::{resolve_product_hooks, HookPhase, HookScript};
use crate::model::{OperationOutputs, Product, Session};
use crate::params::{load_bootprep, GlobalParamsBuilder};
use crate::ports::{ExecutionEngine, TokenIssuer};

/// Result of compiling a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedGraph {
    /// A graph with at least one task.
    Submit(TaskGraph),
    /// The stage currently has no work.
    Skip,
}

/// Arguments shared by every task built for one product (or for none).
#[derive(Debug, Clone)]
struct TaskArgs<'a> {
    token: &'a str,
    params: &'a str,
}

/// A hook task request.
#[derive(Debug, Clone, Copy)]
pub struct HookTaskSpec<'a> {
    /// Product the hook belongs to.
    pub product: &'a Product,
    /// The declared hook.
    pub hook: &'a HookScript,
    /// Pre or post.
    pub phase: HookPhase,
    /// Stage being compiled.
    pub stage: &'a str,
}

/// Compiles a session's current stage into a task graph.
pub struct GraphGenerator<'a> {
    engine: &'a dyn ExecutionEngine,
    tokens: &'a dyn TokenIssuer,
    catalog: &'a StagesCatalog,
    config: &'a EngineConfig,
}

impl std::fmt::Debug for GraphGenerator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphGenerator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> GraphGenerator<'a> {
    /// Creates a generator.
    #[must_use]
    pub fn new(
        engine: &'a dyn ExecutionEngine,
        tokens: &'a dyn TokenIssuer,
        catalog: &'a StagesCatalog,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            engine,
            tokens,
            catalog,
            config,
        }
    }

    /// Compiles `session.current_stage`.
    ///
    /// Unregistered operations, unusable hooks and hooks escaping their
    /// product directory are skipped. A stage left with no tasks yields
    /// [`GeneratedGraph::Skip`].
    pub async fn generate_stage_graph(
        &self,
        session: &Session,
        outputs: &OperationOutputs,
    ) -> Result<GeneratedGraph, IufError> {
        if session.current_stage.is_empty() {
            return Err(IufError::NoCurrentStage {
                session: session.name.clone(),
            });
        }
        let stage = self
            .catalog
            .get(&session.current_stage)
            .ok_or_else(|| IufError::UnknownStage {
                stage: session.current_stage.clone(),
            })?;

        let templates = self.engine.list_registered_templates().await?;
        let operations = registered_operations(stage, &templates);

        let (pre_hooks, post_hooks) = if stage.no_hooks {
            (BTreeMap::new(), BTreeMap::new())
        } else {
            (
                resolve_product_hooks(&session.products, &stage.name, HookPhase::Pre),
                resolve_product_hooks(&session.products, &stage.name, HookPhase::Post),
            )
        };

        let no_products = stage.stage_type == StageType::Product && session.products.is_empty();
        let no_tasks = operations.is_empty() && pre_hooks.is_empty() && post_hooks.is_empty();
        if no_products || no_tasks {
            tracing::info!(session = %session.name, stage = %stage.name, "Stage has no work");
            return Ok(GeneratedGraph::Skip);
        }

        let bootprep = load_bootprep(&session.input_parameters).await;
        let builder = GlobalParamsBuilder::new(session, outputs, self.catalog, &bootprep)
            .with_process_media_stage(&self.config.process_media_stage);
        let mut product_params = BTreeMap::new();
        for (key, params) in builder.build_per_product() {
            product_params.insert(key, serde_json::to_string(&params)?);
        }
        let shared_params = serde_json::to_string(&builder.build(None))?;
        let token = self.tokens.issue_token().await?;

        let mut emitter = Emitter {
            generator: self,
            stage,
            token: &token,
            tasks: Vec::new(),
        };
        match stage.stage_type {
            StageType::Product => {
                emitter.product_chains(session, &operations, &pre_hooks, &post_hooks, &product_params);
            }
            StageType::Global => emitter.global_rounds(
                session,
                &operations,
                &pre_hooks,
                &post_hooks,
                &product_params,
                &shared_params,
            ),
        }
        let tasks = emitter.tasks;

        if tasks.is_empty() {
            tracing::info!(session = %session.name, stage = %stage.name, "Stage has no work");
            return Ok(GeneratedGraph::Skip);
        }

        let graph = TaskGraph {
            name: sanitize_task_name(
                &format!("{}-{}", session.name, stage.name),
                self.config.max_task_name_len,
            ),
            labels: BTreeMap::from([
                (LABEL_ACTIVITY.to_string(), session.activity_ref.clone()),
                (LABEL_SESSION.to_string(), session.name.clone()),
                (LABEL_STAGE.to_string(), stage.name.clone()),
                (LABEL_STAGE_TYPE.to_string(), stage.stage_type.to_string()),
            ]),
            tasks,
        };
        graph.validate()?;

        tracing::debug!(
            session = %session.name,
            stage = %stage.name,
            tasks = graph.len(),
            "Compiled stage graph"
        );
        Ok(GeneratedGraph::Submit(graph))
    }

    /// Builds the task running a product hook script.
    ///
    /// Fails with `PathTraversal` when the script resolves outside the
    /// product's extraction directory, and with a validation error when no
    /// hook template is bound to the hook's execution context.
    pub fn create_hook_task(
        &self,
        spec: HookTaskSpec<'_>,
        token: &str,
        params: &str,
        dependencies: Vec<String>,
    ) -> Result<Task, IufError> {
        let key = spec.product.key();
        let template = self
            .catalog
            .hook_template(&spec.hook.execution_context)
            .ok_or_else(|| {
                ValidationError::new(format!(
                    "No hook template for execution context '{}'",
                    spec.hook.execution_context
                ))
                .with_field("execution_context")
            })?;

        let script = resolve_script_path(
            &key,
            &spec.product.original_location,
            &spec.hook.script_path,
        )?;

        let name = sanitize_task_name(
            &hook_task_name(&key, spec.phase, spec.stage),
            self.config.max_task_name_len,
        );
        Ok(Task::new(name)
            .with_template(template, &self.config.template_entrypoint)
            .with_dependencies(dependencies)
            .with_argument(ARG_AUTH_TOKEN, token)
            .with_argument(ARG_GLOBAL_PARAMS, params)
            .with_argument(ARG_SCRIPT_PATH, script.to_string_lossy()))
    }

    fn operation_task(
        &self,
        product_key: Option<&str>,
        operation: &Operation,
        args: &TaskArgs<'_>,
        dependencies: Vec<String>,
    ) -> Task {
        let name = sanitize_task_name(
            &operation_task_name(product_key, &operation.name),
            self.config.max_task_name_len,
        );
        let mut task = Task::new(name)
            .with_template(&operation.name, &self.config.template_entrypoint)
            .with_dependencies(dependencies)
            .with_argument(ARG_AUTH_TOKEN, args.token)
            .with_argument(ARG_GLOBAL_PARAMS, args.params);

        for (key, value) in &operation.static_parameters {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            task.arguments.entry(key.clone()).or_insert(value);
        }
        task
    }
}

fn registered_operations<'s>(stage: &'s Stage, templates: &HashSet<String>) -> Vec<&'s Operation> {
    stage
        .operations
        .iter()
        .filter(|op| {
            let registered = templates.contains(&op.name);
            if !registered {
                tracing::warn!(
                    stage = %stage.name,
                    operation = %op.name,
                    "Operation template is not registered; skipping"
                );
            }
            registered
        })
        .collect()
}

struct Emitter<'g, 'a> {
    generator: &'g GraphGenerator<'a>,
    stage: &'g Stage,
    token: &'g str,
    tasks: Vec<Task>,
}

impl Emitter<'_, '_> {
    fn product_chains(
        &mut self,
        session: &Session,
        operations: &[&Operation],
        pre_hooks: &BTreeMap<String, HookScript>,
        post_hooks: &BTreeMap<String, HookScript>,
        params: &BTreeMap<String, String>,
    ) {
        for product in &session.products {
            let key = product.key();
            let Some(product_params) = params.get(&key) else {
                continue;
            };
            let args = TaskArgs {
                token: self.token,
                params: product_params,
            };

            let mut last = pre_hooks
                .get(&key)
                .and_then(|hook| self.hook(product, hook, HookPhase::Pre, &args, Vec::new()));

            for operation in operations {
                let task = self.generator.operation_task(
                    Some(&key),
                    operation,
                    &args,
                    last.iter().cloned().collect(),
                );
                last = Some(task.name.clone());
                self.tasks.push(task);
            }

            if let Some(hook) = post_hooks.get(&key) {
                self.hook(product, hook, HookPhase::Post, &args, last.into_iter().collect());
            }
        }
    }

    fn global_rounds(
        &mut self,
        session: &Session,
        operations: &[&Operation],
        pre_hooks: &BTreeMap<String, HookScript>,
        post_hooks: &BTreeMap<String, HookScript>,
        params: &BTreeMap<String, String>,
        shared_params: &str,
    ) {
        let mut previous_round = Vec::new();
        for product in &session.products {
            let key = product.key();
            if let (Some(hook), Some(product_params)) = (pre_hooks.get(&key), params.get(&key)) {
                let args = TaskArgs {
                    token: self.token,
                    params: product_params,
                };
                if let Some(name) = self.hook(product, hook, HookPhase::Pre, &args, Vec::new()) {
                    previous_round.push(name);
                }
            }
        }

        let shared = TaskArgs {
            token: self.token,
            params: shared_params,
        };
        for operation in operations {
            let task =
                self.generator
                    .operation_task(None, operation, &shared, previous_round.clone());
            previous_round = vec![task.name.clone()];
            self.tasks.push(task);
        }

        for product in &session.products {
            let key = product.key();
            if let (Some(hook), Some(product_params)) = (post_hooks.get(&key), params.get(&key)) {
                let args = TaskArgs {
                    token: self.token,
                    params: product_params,
                };
                self.hook(product, hook, HookPhase::Post, &args, previous_round.clone());
            }
        }
    }

    /// Emits a hook task, returning its name, or logs and skips it.
    fn hook(
        &mut self,
        product: &Product,
        hook: &HookScript,
        phase: HookPhase,
        args: &TaskArgs<'_>,
        dependencies: Vec<String>,
    ) -> Option<String> {
        let spec = HookTaskSpec {
            product,
            hook,
            phase,
            stage: &self.stage.name,
        };
        match self
            .generator
            .create_hook_task(spec, args.token, args.params, dependencies)
        {
            Ok(task) => {
                let name = task.name.clone();
                self.tasks.push(task);
                Some(name)
            }
            Err(IufError::PathTraversal(err)) => {
                tracing::error!(
                    stage = %self.stage.name,
                    product = %err.product,
                    script_path = %err.script_path,
                    resolved = %err.resolved.display(),
                    "Hook script escapes product directory; skipping hook"
                );
                None
            }
            Err(err) => {
                tracing::warn!(
                    stage = %self.stage.name,
                    product = %product.key(),
                    phase = %phase,
                    error = %err,
                    "Skipping hook"
                );
                None
            }
        }
    }
}
