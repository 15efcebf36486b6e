//! Task graph representation handed to the execution engine.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::errors::GraphValidationError;
pub use crate::store::LABEL_ACTIVITY;

/// Label naming the session that submitted the graph.
pub const LABEL_SESSION: &str = "session";
/// Label naming the compiled stage.
pub const LABEL_STAGE: &str = "stage";
/// Label carrying the stage type (`product` or `global`).
pub const LABEL_STAGE_TYPE: &str = "stage_type";

/// Argument carrying the issued auth token.
pub const ARG_AUTH_TOKEN: &str = "auth_token";
/// Argument carrying the serialized global parameters.
pub const ARG_GLOBAL_PARAMS: &str = "global_params";
/// Argument carrying a hook's script path.
pub const ARG_SCRIPT_PATH: &str = "script_path";

/// Reference to a registered engine template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    /// Registered template name.
    pub name: String,
    /// Entrypoint inside the template.
    pub template: String,
}

/// One node of a task graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task name, unique within the graph.
    pub name: String,
    /// Names of tasks that must finish first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Template the task runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateRef>,
    /// Key/value task arguments.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, String>,
}

impl Task {
    /// Creates a task without dependencies or arguments.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            template: None,
            arguments: BTreeMap::new(),
        }
    }

    /// Sets the template reference.
    #[must_use]
    pub fn with_template(mut self, name: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        self.template = Some(TemplateRef {
            name: name.into(),
            template: entrypoint.into(),
        });
        self
    }

    /// Replaces the dependency list.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Adds an argument.
    #[must_use]
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Returns the template name, if any.
    #[must_use]
    pub fn template_name(&self) -> Option<&str> {
        self.template.as_ref().map(|t| t.name.as_str())
    }
}

/// The compiled task graph for one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGraph {
    /// Graph name.
    pub name: String,
    /// Labels used to find the graph again.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Tasks in emission order.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl TaskGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            tasks: Vec::new(),
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if the graph has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Looks up a task by name.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Checks for duplicate names, dangling dependencies and cycles.
    pub fn validate(&self) -> Result<(), GraphValidationError> {
        let mut names = HashSet::new();
        for task in &self.tasks {
            if !names.insert(task.name.as_str()) {
                return Err(GraphValidationError::DuplicateTask(task.name.clone()));
            }
        }

        for task in &self.tasks {
            if let Some(missing) = task
                .dependencies
                .iter()
                .find(|dep| !names.contains(dep.as_str()))
            {
                return Err(GraphValidationError::UnknownDependency {
                    task: task.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        self.detect_cycle()
    }

    /// Returns task names ordered so that dependencies come first.
    ///
    /// Ties are broken by emission order. Dependencies on unknown tasks are
    /// ignored; call [`TaskGraph::validate`] first to reject them.
    #[must_use]
    pub fn topological_order(&self) -> Vec<&str> {
        let tasks = self.index();
        let mut result = Vec::with_capacity(self.tasks.len());
        let mut visited = HashSet::new();
        let mut in_progress = HashSet::new();

        fn visit<'a>(
            name: &'a str,
            tasks: &HashMap<&'a str, &'a Task>,
            visited: &mut HashSet<&'a str>,
            in_progress: &mut HashSet<&'a str>,
            result: &mut Vec<&'a str>,
        ) {
            if visited.contains(name) || !in_progress.insert(name) {
                return;
            }
            if let Some(task) = tasks.get(name) {
                for dep in &task.dependencies {
                    if let Some(&dep) = tasks.get(dep.as_str()) {
                        visit(&dep.name, tasks, visited, in_progress, result);
                    }
                }
            }
            in_progress.remove(name);
            visited.insert(name);
            result.push(name);
        }

        for task in &self.tasks {
            visit(&task.name, &tasks, &mut visited, &mut in_progress, &mut result);
        }
        result
    }

    fn index(&self) -> HashMap<&str, &Task> {
        self.tasks.iter().map(|t| (t.name.as_str(), t)).collect()
    }

    fn detect_cycle(&self) -> Result<(), GraphValidationError> {
        let tasks = self.index();
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        let mut path = Vec::new();

        fn dfs<'a>(
            name: &'a str,
            tasks: &HashMap<&'a str, &'a Task>,
            visited: &mut HashSet<&'a str>,
            stack: &mut HashSet<&'a str>,
            path: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            visited.insert(name);
            stack.insert(name);
            path.push(name);

            if let Some(task) = tasks.get(name) {
                for dep in &task.dependencies {
                    let dep = dep.as_str();
                    if stack.contains(dep) {
                        let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(ToString::to_string).collect();
                        cycle.push(dep.to_string());
                        return Some(cycle);
                    }
                    if let Some(&next) = tasks.get(dep) {
                        if !visited.contains(dep) {
                            if let Some(cycle) = dfs(&next.name, tasks, visited, stack, path) {
                                return Some(cycle);
                            }
                        }
                    }
                }
            }

            path.pop();
            stack.remove(name);
            None
        }

        for task in &self.tasks {
            if !visited.contains(task.name.as_str()) {
                if let Some(cycle) = dfs(&task.name, &tasks, &mut visited, &mut stack, &mut path) {
                    return Err(GraphValidationError::Cycle(cycle));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn task(name: &str, deps: &[&str]) -> Task {
        Task::new(name).with_dependencies(deps.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn test_valid_graph() {
        let mut graph = TaskGraph::new("g");
        graph.tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["a", "b"])];
        assert!(graph.validate().is_ok());
        assert_eq!(graph.topological_order(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        let mut graph = TaskGraph::new("g");
        graph.tasks = vec![task("post", &["op"]), task("op", &["pre"]), task("pre", &[])];
        assert_eq!(graph.topological_order(), vec!["pre", "op", "post"]);
    }

    #[test]
    fn test_duplicate_task() {
        let mut graph = TaskGraph::new("g");
        graph.tasks = vec![task("a", &[]), task("a", &[])];
        assert_eq!(
            graph.validate(),
            Err(GraphValidationError::DuplicateTask("a".to_string()))
        );
    }

    #[test]
    fn test_dangling_dependency() {
        let mut graph = TaskGraph::new("g");
        graph.tasks = vec![task("a", &["ghost"])];
        assert!(matches!(
            graph.validate(),
            Err(GraphValidationError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = TaskGraph::new("g");
        graph.tasks = vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"])];
        let Err(GraphValidationError::Cycle(cycle)) = graph.validate() else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);
    }

    #[test]
    fn test_task_serialization_skips_empty_fields() {
        let value = serde_json::to_value(Task::new("a")).unwrap();
        assert_eq!(value, serde_json::json!({"name": "a"}));
    }
}
