//! Activity records and their parameter blocks.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::OperationOutputs;

/// A JSON object used for free-form configuration maps.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// The admin-visible state of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    /// Nothing is running; the admin decides what happens next.
    #[default]
    WaitForAdmin,
    /// A session is executing stages.
    InProgress,
    /// Execution was paused by the admin.
    Paused,
    /// Execution is held for debugging.
    Debug,
    /// The activity may not proceed.
    Blocked,
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitForAdmin => write!(f, "wait_for_admin"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Paused => write!(f, "paused"),
            Self::Debug => write!(f, "debug"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// How managed (compute) nodes pick up new images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedRolloutStrategy {
    /// Reboot nodes into the new image.
    Reboot,
    /// Stage the image for the next reboot.
    #[default]
    Stage,
}

/// Admin-supplied inputs that drive an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParameters {
    /// Directory holding the product media.
    #[serde(default)]
    pub media_dir: String,
    /// Host on which the media directory lives.
    #[serde(default = "default_media_host")]
    pub media_host: String,
    /// Bootprep file for managed nodes, relative to `media_dir`.
    #[serde(default)]
    pub bootprep_config_managed: String,
    /// Bootprep file for management nodes, relative to `media_dir`.
    #[serde(default)]
    pub bootprep_config_management: String,
    /// Management nodes the activity is limited to.
    #[serde(default)]
    pub limit_management_nodes: Vec<String>,
    /// Managed nodes the activity is limited to.
    #[serde(default)]
    pub limit_managed_nodes: Vec<String>,
    /// Rollout strategy for managed nodes.
    #[serde(default)]
    pub managed_rollout_strategy: ManagedRolloutStrategy,
    /// Percentage of management nodes rolled out at once.
    #[serde(default = "default_rollout_percentage")]
    pub concurrent_management_rollout_percentage: i64,
    /// Maximum number of concurrent operations.
    #[serde(default)]
    pub concurrency: i64,
    /// Re-run operations even when they already succeeded.
    #[serde(default)]
    pub force: bool,
    /// Ordered stage names to execute.
    #[serde(default)]
    pub stages: Vec<String>,
}

fn default_media_host() -> String {
    "ncn-m001".to_string()
}

fn default_rollout_percentage() -> i64 {
    20
}

impl Default for InputParameters {
    fn default() -> Self {
        Self {
            media_dir: String::new(),
            media_host: default_media_host(),
            bootprep_config_managed: String::new(),
            bootprep_config_management: String::new(),
            limit_management_nodes: Vec::new(),
            limit_managed_nodes: Vec::new(),
            managed_rollout_strategy: ManagedRolloutStrategy::default(),
            concurrent_management_rollout_percentage: default_rollout_percentage(),
            concurrency: 0,
            force: false,
            stages: Vec::new(),
        }
    }
}

impl InputParameters {
    /// Creates input parameters for the given stages.
    #[must_use]
    pub fn with_stages(stages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            stages: stages.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sets the media directory.
    #[must_use]
    pub fn with_media_dir(mut self, media_dir: impl Into<String>) -> Self {
        self.media_dir = media_dir.into();
        self
    }
}

/// Site-specific configuration shared by all tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteParameters {
    /// Settings that apply to every product.
    #[serde(default)]
    pub global: JsonMap,
    /// Settings keyed by product name.
    #[serde(default)]
    pub products: BTreeMap<String, JsonMap>,
    /// Deprecated JSON-string form of the whole block.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub site_parameters: String,
}

#[derive(Debug, Default, Deserialize)]
struct LegacySiteParameters {
    #[serde(default)]
    global: JsonMap,
    #[serde(default)]
    products: BTreeMap<String, JsonMap>,
}

impl SiteParameters {
    /// Returns the effective `(global, products)` pair.
    ///
    /// Structured `products` always win. The legacy string is only consulted
    /// when `products` is empty, and a parse failure there is ignored.
    #[must_use]
    pub fn resolved(&self) -> (JsonMap, BTreeMap<String, JsonMap>) {
        if !self.products.is_empty() || self.site_parameters.trim().is_empty() {
            return (self.global.clone(), self.products.clone());
        }

        match serde_json::from_str::<LegacySiteParameters>(&self.site_parameters) {
            Ok(legacy) => {
                let global = if self.global.is_empty() {
                    legacy.global
                } else {
                    self.global.clone()
                };
                (global, legacy.products)
            }
            Err(err) => {
                tracing::debug!(error = %err, "Ignoring unparsable legacy site parameters");
                (self.global.clone(), BTreeMap::new())
            }
        }
    }
}

/// A product delivered by the activity's media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product name.
    pub name: String,
    /// Product version.
    pub version: String,
    /// Directory the product tarball was extracted into.
    #[serde(default)]
    pub original_location: String,
    /// Raw manifest document.
    #[serde(default)]
    pub manifest: String,
    /// Whether the manifest passed validation.
    #[serde(default)]
    pub validated: bool,
}

impl Product {
    /// Creates a new product.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            original_location: String::new(),
            manifest: String::new(),
            validated: false,
        }
    }

    /// Sets the extraction directory.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.original_location = location.into();
        self
    }

    /// Sets the manifest document.
    #[must_use]
    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = manifest.into();
        self
    }

    /// Returns the `<name>-<version>` key used across stage outputs.
    #[must_use]
    pub fn key(&self) -> String {
        product_key(&self.name, &self.version)
    }
}

/// Builds the `<name>-<version>` product key.
#[must_use]
pub fn product_key(name: &str, version: &str) -> String {
    format!("{name}-{version}")
}

/// One admin-declared install/upgrade intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Unique activity name.
    pub name: String,
    /// Admin inputs.
    #[serde(default)]
    pub input_parameters: InputParameters,
    /// Site configuration.
    #[serde(default)]
    pub site_parameters: SiteParameters,
    /// Products discovered so far.
    #[serde(default)]
    pub products: Vec<Product>,
    /// Current admin-visible state.
    #[serde(default)]
    pub activity_state: ActivityState,
    /// Outputs of every completed stage.
    #[serde(default)]
    pub operation_outputs: OperationOutputs,
    /// Store version used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
}

impl Activity {
    /// Creates an activity in `wait_for_admin`.
    #[must_use]
    pub fn new(name: impl Into<String>, input_parameters: InputParameters) -> Self {
        Self {
            name: name.into(),
            input_parameters,
            site_parameters: SiteParameters::default(),
            products: Vec::new(),
            activity_state: ActivityState::WaitForAdmin,
            operation_outputs: OperationOutputs::default(),
            resource_version: 0,
        }
    }

    /// Inserts a product, replacing any entry with the same name and version.
    pub fn upsert_product(&mut self, product: Product) {
        match self
            .products
            .iter_mut()
            .find(|p| p.name == product.name && p.version == product.version)
        {
            Some(existing) => *existing = product,
            None => self.products.push(product),
        }
    }
}

/// Deserializes an activity state where `""` means "no change".
pub(crate) fn empty_state_as_none<'de, D>(deserializer: D) -> Result<Option<ActivityState>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(value) => serde_json::from_value(serde_json::Value::String(value.to_string()))
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_activity_state_display() {
        assert_eq!(ActivityState::WaitForAdmin.to_string(), "wait_for_admin");
        assert_eq!(ActivityState::InProgress.to_string(), "in_progress");
        assert_eq!(ActivityState::Blocked.to_string(), "blocked");
    }

    #[test]
    fn test_product_key() {
        let product = Product::new("cos", "2.5.0");
        assert_eq!(product.key(), "cos-2.5.0");
    }

    #[test]
    fn test_site_parameters_structured_products_win() {
        let mut site = SiteParameters::default();
        site.products.insert(
            "cos".to_string(),
            serde_json::json!({"vcs_branch": "main"}).as_object().unwrap().clone(),
        );
        site.site_parameters = r#"{"products": {"sdu": {"x": 1}}}"#.to_string();

        let (_, products) = site.resolved();
        assert!(products.contains_key("cos"));
        assert!(!products.contains_key("sdu"));
    }

    #[test]
    fn test_site_parameters_legacy_fallback() {
        let site = SiteParameters {
            site_parameters: r#"{"global": {"g": true}, "products": {"sdu": {"x": 1}}}"#
                .to_string(),
            ..SiteParameters::default()
        };

        let (global, products) = site.resolved();
        assert_eq!(global.get("g"), Some(&serde_json::json!(true)));
        assert_eq!(products["sdu"].get("x"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn test_site_parameters_legacy_garbage_ignored() {
        let site = SiteParameters {
            site_parameters: "{not json".to_string(),
            ..SiteParameters::default()
        };

        let (global, products) = site.resolved();
        assert!(global.is_empty());
        assert!(products.is_empty());
    }

    #[test]
    fn test_upsert_product_replaces_same_version() {
        let mut activity = Activity::new("a1", InputParameters::default());
        activity.upsert_product(Product::new("cos", "1.0"));
        activity.upsert_product(Product::new("cos", "1.0").with_location("/media/cos"));
        activity.upsert_product(Product::new("cos", "2.0"));

        assert_eq!(activity.products.len(), 2);
        assert_eq!(activity.products[0].original_location, "/media/cos");
    }

    #[test]
    fn test_input_parameters_defaults() {
        let params: InputParameters = serde_json::from_str("{}").unwrap();
        assert_eq!(params.media_host, "ncn-m001");
        assert_eq!(params.concurrent_management_rollout_percentage, 20);
        assert_eq!(params.managed_rollout_strategy, ManagedRolloutStrategy::Stage);
    }
}
