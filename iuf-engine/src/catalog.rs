//! The stages catalog.
//!
//! The catalog is static configuration loaded once per process. It lists
//! every stage the engine knows, in canonical order, and maps hook execution
//! contexts to the engine templates that run hook scripts:
//!
//! ```yaml
//! stages:
//!   - name: process-media
//!     type: global
//!     no-hooks: true
//!     operations:
//!       - name: extract-release-distributions
//!   - name: deliver-product
//!     type: product
//!     operations:
//!       - name: loftsman-manifest-upload
//!       - name: s3-upload
//!         static-parameters:
//!           bucket: fw-update
//! hooks:
//!   master_host: master-host-hook-script
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::errors::{IufError, ValidationError};

/// Whether a stage runs once per product or once for all products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StageType {
    /// One task chain per product.
    Product,
    /// One shared task chain. Any unrecognized type string means global.
    #[default]
    Global,
}

impl From<String> for StageType {
    fn from(value: String) -> Self {
        if value == "product" {
            Self::Product
        } else {
            Self::Global
        }
    }
}

impl From<StageType> for String {
    fn from(value: StageType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product => write!(f, "product"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// A unit of work mapped to a registered engine template of the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Operation {
    /// Operation (and template) name.
    pub name: String,
    /// Extra arguments passed verbatim to the task.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub static_parameters: BTreeMap<String, serde_json::Value>,
}

impl Operation {
    /// Creates an operation without static parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            static_parameters: BTreeMap::new(),
        }
    }
}

/// A named pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Stage {
    /// Stage name.
    pub name: String,
    /// Stage type.
    #[serde(rename = "type", default)]
    pub stage_type: StageType,
    /// Disables product hooks for this stage.
    #[serde(default)]
    pub no_hooks: bool,
    /// Operations in execution order.
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl Stage {
    /// Creates a stage without operations.
    #[must_use]
    pub fn new(name: impl Into<String>, stage_type: StageType) -> Self {
        Self {
            name: name.into(),
            stage_type,
            no_hooks: false,
            operations: Vec::new(),
        }
    }

    /// Appends an operation.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operations.push(Operation::new(operation));
        self
    }

    /// Disables hooks.
    #[must_use]
    pub fn without_hooks(mut self) -> Self {
        self.no_hooks = true;
        self
    }
}

/// Ordered stage definitions plus hook template bindings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagesCatalog {
    /// Stages in canonical order.
    #[serde(default)]
    pub stages: Vec<Stage>,
    /// Execution context name to hook template name.
    #[serde(default)]
    pub hooks: BTreeMap<String, String>,
}

impl StagesCatalog {
    /// Creates a catalog from stages.
    #[must_use]
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            hooks: BTreeMap::new(),
        }
    }

    /// Binds an execution context to a hook template.
    #[must_use]
    pub fn with_hook(mut self, context: impl Into<String>, template: impl Into<String>) -> Self {
        self.hooks.insert(context.into(), template.into());
        self
    }

    /// Parses a catalog from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or names a stage twice.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, IufError> {
        let catalog: Self = serde_yaml::from_str(yaml)?;
        catalog.check_unique()?;
        Ok(catalog)
    }

    /// Parses a catalog from a YAML reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or names a stage twice.
    pub fn from_reader(reader: impl Read) -> Result<Self, IufError> {
        let catalog: Self = serde_yaml::from_reader(reader)?;
        catalog.check_unique()?;
        Ok(catalog)
    }

    /// Loads a catalog from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, IufError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            IufError::Serialization(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns the type of a stage, if it is known.
    #[must_use]
    pub fn stage_type(&self, name: &str) -> Option<StageType> {
        self.get(name).map(|s| s.stage_type)
    }

    /// Returns the hook template bound to an execution context.
    #[must_use]
    pub fn hook_template(&self, execution_context: &str) -> Option<&str> {
        self.hooks.get(execution_context).map(String::as_str)
    }

    /// Checks that every stage in an admin-supplied list exists and appears
    /// only once.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first unknown or repeated stage.
    pub fn validate_stage_list(&self, stages: &[String]) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for name in stages {
            if self.get(name).is_none() {
                return Err(ValidationError::new(format!(
                    "Stage '{name}' is not defined in the stages catalog"
                ))
                .with_field("stages"));
            }
            if !seen.insert(name.as_str()) {
                return Err(ValidationError::new(format!(
                    "Stage '{name}' is listed more than once"
                ))
                .with_field("stages"));
            }
        }
        Ok(())
    }

    fn check_unique(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(ValidationError::new(format!(
                    "Stage '{}' is defined more than once",
                    stage.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const CATALOG: &str = r"
stages:
  - name: process-media
    type: global
    no-hooks: true
    operations:
      - name: extract-release-distributions
  - name: deliver-product
    type: product
    operations:
      - name: loftsman-manifest-upload
      - name: s3-upload
        static-parameters:
          bucket: fw-update
  - name: management-nodes-rollout
    type: management
hooks:
  master_host: master-host-hook-script
";

    #[test]
    fn test_parse_catalog() {
        let catalog = StagesCatalog::from_yaml_str(CATALOG).unwrap();
        assert_eq!(catalog.stages.len(), 3);

        let media = catalog.get("process-media").unwrap();
        assert!(media.no_hooks);
        assert_eq!(media.stage_type, StageType::Global);

        let deliver = catalog.get("deliver-product").unwrap();
        assert_eq!(deliver.stage_type, StageType::Product);
        assert_eq!(
            deliver.operations[1].static_parameters["bucket"],
            serde_json::json!("fw-update")
        );

        assert_eq!(catalog.hook_template("master_host"), Some("master-host-hook-script"));
    }

    #[test]
    fn test_unknown_type_is_global() {
        let catalog = StagesCatalog::from_yaml_str(CATALOG).unwrap();
        assert_eq!(
            catalog.stage_type("management-nodes-rollout"),
            Some(StageType::Global)
        );
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let yaml = "stages:\n  - name: a\n  - name: a\n";
        assert!(StagesCatalog::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_validate_stage_list() {
        let catalog = StagesCatalog::from_yaml_str(CATALOG).unwrap();
        assert!(catalog
            .validate_stage_list(&["process-media".to_string(), "deliver-product".to_string()])
            .is_ok());

        let err = catalog
            .validate_stage_list(&["process-media".to_string(), "bogus".to_string()])
            .unwrap_err();
        assert!(err.message.contains("bogus"));
        assert_eq!(err.field.as_deref(), Some("stages"));
    }

    #[test]
    fn test_repeated_stage_in_list_rejected() {
        let catalog = StagesCatalog::from_yaml_str(CATALOG).unwrap();
        let stages: Vec<String> = ["deliver-product", "process-media", "deliver-product"]
            .iter()
            .map(ToString::to_string)
            .collect();

        let err = catalog.validate_stage_list(&stages).unwrap_err();
        assert!(err.message.contains("deliver-product"));
        assert_eq!(err.field.as_deref(), Some("stages"));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let catalog = StagesCatalog::from_path(file.path()).unwrap();
        assert_eq!(catalog.stages[0].name, "process-media");
    }

    #[test]
    fn test_from_reader() {
        let catalog = StagesCatalog::from_reader(CATALOG.as_bytes()).unwrap();
        assert_eq!(catalog.stages.len(), 3);
    }

    #[test]
    fn test_stage_type_serializes_as_string() {
        let stage = Stage::new("deploy-product", StageType::Product).with_operation("deploy");
        let yaml = serde_yaml::to_string(&stage).unwrap();
        assert!(yaml.contains("type: product"));
    }
}
