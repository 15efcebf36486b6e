//! Typed stage outputs accumulated on an activity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::JsonMap;

/// Outputs of a stage that ran once per product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductStageOutput {
    /// Outputs keyed by `<name>-<version>` product key.
    #[serde(default)]
    pub products: BTreeMap<String, JsonMap>,
}

impl ProductStageOutput {
    /// Deep-merges `values` into the entry for `product_key`.
    pub fn merge_product(&mut self, product_key: &str, values: JsonMap) {
        let entry = self.products.entry(product_key.to_string()).or_default();
        merge_maps(entry, values);
    }
}

/// Outputs of a stage that ran once for all products.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStageOutput {
    /// Outputs shared by every product.
    #[serde(default)]
    pub global: JsonMap,
}

impl GlobalStageOutput {
    /// Deep-merges `values` into the global outputs.
    pub fn merge(&mut self, values: JsonMap) {
        merge_maps(&mut self.global, values);
    }
}

/// The recorded outputs of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage_type", rename_all = "snake_case")]
pub enum StageOutputRecord {
    /// Per-product outputs.
    Product(ProductStageOutput),
    /// Shared outputs.
    Global(GlobalStageOutput),
}

/// Outputs of every completed stage, keyed by stage name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationOutputs {
    stages: BTreeMap<String, StageOutputRecord>,
}

impl OperationOutputs {
    /// Creates an empty set of outputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for a stage.
    #[must_use]
    pub fn get(&self, stage: &str) -> Option<&StageOutputRecord> {
        self.stages.get(stage)
    }

    /// Iterates over `(stage, record)` pairs in stage-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &StageOutputRecord)> {
        self.stages.iter()
    }

    /// Returns true if no stage produced outputs yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the product record for `stage`, creating or converting it.
    ///
    /// A stage previously recorded as global is replaced, since a stage's
    /// type is fixed by the catalog and the newest shape wins.
    pub fn product_stage_mut(&mut self, stage: &str) -> &mut ProductStageOutput {
        let record = self
            .stages
            .entry(stage.to_string())
            .or_insert_with(|| StageOutputRecord::Product(ProductStageOutput::default()));
        if !matches!(record, StageOutputRecord::Product(_)) {
            *record = StageOutputRecord::Product(ProductStageOutput::default());
        }
        match record {
            StageOutputRecord::Product(output) => output,
            StageOutputRecord::Global(_) => unreachable!("record converted to product above"),
        }
    }

    /// Returns the global record for `stage`, creating or converting it.
    pub fn global_stage_mut(&mut self, stage: &str) -> &mut GlobalStageOutput {
        let record = self
            .stages
            .entry(stage.to_string())
            .or_insert_with(|| StageOutputRecord::Global(GlobalStageOutput::default()));
        if !matches!(record, StageOutputRecord::Global(_)) {
            *record = StageOutputRecord::Global(GlobalStageOutput::default());
        }
        match record {
            StageOutputRecord::Global(output) => output,
            StageOutputRecord::Product(_) => unreachable!("record converted to global above"),
        }
    }
}

/// Recursively merges `patch` into `target`. Non-object values overwrite.
pub fn deep_merge(target: &mut serde_json::Value, patch: serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target), serde_json::Value::Object(patch)) => {
            merge_maps(target, patch);
        }
        (target, patch) => *target = patch,
    }
}

/// Recursively merges `patch` into the map `target`.
pub fn merge_maps(target: &mut JsonMap, patch: JsonMap) {
    for (key, value) in patch {
        match target.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                target.insert(key, value);
            }
        }
    }
}
