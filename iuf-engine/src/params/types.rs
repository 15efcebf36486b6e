//! Global parameter sections.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{JsonMap, ManagedRolloutStrategy};

/// The configuration blob handed to every task of a stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalParams {
    /// Manifest of the product the task runs for.
    #[serde(default)]
    pub product_manifest: ProductManifestParams,
    /// Admin inputs.
    #[serde(default)]
    pub input_params: InputParams,
    /// Site configuration.
    #[serde(default)]
    pub site_params: SiteParams,
    /// Outputs of previous stages, keyed by stage name.
    #[serde(default)]
    pub stage_params: BTreeMap<String, StageParams>,
}

impl GlobalParams {
    /// Returns the `<name>-<version>` key of the current product, if any.
    #[must_use]
    pub fn product_key(&self) -> Option<String> {
        self.product_manifest
            .current_product
            .as_ref()
            .map(|p| crate::model::product_key(&p.name, &p.version))
    }
}

/// Manifest section. Empty for the product-less variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductManifestParams {
    /// The product being processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_product: Option<CurrentProduct>,
}

/// The product a task is built for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentProduct {
    /// Product name.
    pub name: String,
    /// Product version.
    pub version: String,
    /// Extraction directory.
    #[serde(default)]
    pub original_location: String,
    /// Parsed manifest, or `null` when it could not be parsed.
    #[serde(default)]
    pub manifest: serde_json::Value,
}

/// Input parameter section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputParams {
    /// Keys of every product in the session.
    #[serde(default)]
    pub products: Vec<String>,
    /// Media directory.
    #[serde(default)]
    pub media_dir: String,
    /// Media host.
    #[serde(default)]
    pub media_host: String,
    /// Parsed managed-node bootprep file.
    #[serde(default)]
    pub bootprep_config_managed: serde_json::Value,
    /// Parsed management-node bootprep file.
    #[serde(default)]
    pub bootprep_config_management: serde_json::Value,
    /// Management node limit.
    #[serde(default)]
    pub limit_management_nodes: Vec<String>,
    /// Managed node limit.
    #[serde(default)]
    pub limit_managed_nodes: Vec<String>,
    /// Managed rollout strategy.
    #[serde(default)]
    pub managed_rollout_strategy: ManagedRolloutStrategy,
    /// Management rollout batch percentage.
    #[serde(default)]
    pub concurrent_management_rollout_percentage: i64,
    /// Concurrency limit.
    #[serde(default)]
    pub concurrency: i64,
    /// Force flag.
    #[serde(default)]
    pub force: bool,
}

/// Site parameter section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteParams {
    /// Global site settings.
    #[serde(default)]
    pub global: JsonMap,
    /// Per-product site settings keyed by product name.
    #[serde(default)]
    pub products: BTreeMap<String, JsonMap>,
    /// Site settings of the current product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_product: Option<JsonMap>,
}

/// A previous stage's outputs as seen by a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageParams {
    /// Per-product outputs with an alias for the current product.
    Product {
        /// Outputs keyed by product key.
        products: BTreeMap<String, JsonMap>,
        /// Outputs of the current product.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_product: Option<JsonMap>,
    },
    /// Shared outputs.
    Global {
        /// The whole stage output.
        global: JsonMap,
    },
}
