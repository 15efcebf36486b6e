//! Reusable records and catalogs for tests and benchmarks.

use crate::catalog::{Operation, Stage, StageType, StagesCatalog};
use crate::model::{Activity, InputParameters, Product};

/// Hook template bound to the `master_host` execution context.
pub const MASTER_HOST_HOOK_TEMPLATE: &str = "master-host-hook-script";

/// A catalog mirroring a typical install pipeline.
///
/// | stage | type | operations |
/// |---|---|---|
/// | `process-media` | global, no hooks | `extract-release-distributions` |
/// | `pre-install-check` | global | `preflight-checks-for-services` |
/// | `deliver-product` | product | `loftsman-manifest-upload`, `s3-upload` |
/// | `deploy-product` | product | `loftsman-manifest-deploy` |
#[must_use]
pub fn stages_catalog() -> StagesCatalog {
    let mut s3_upload = Operation::new("s3-upload");
    s3_upload
        .static_parameters
        .insert("bucket".to_string(), serde_json::json!("fw-update"));

    let mut deliver = Stage::new("deliver-product", StageType::Product)
        .with_operation("loftsman-manifest-upload");
    deliver.operations.push(s3_upload);

    StagesCatalog::new(vec![
        Stage::new("process-media", StageType::Global)
            .with_operation("extract-release-distributions")
            .without_hooks(),
        Stage::new("pre-install-check", StageType::Global)
            .with_operation("preflight-checks-for-services"),
        deliver,
        Stage::new("deploy-product", StageType::Product).with_operation("loftsman-manifest-deploy"),
    ])
    .with_hook("master_host", MASTER_HOST_HOOK_TEMPLATE)
}

/// Every template the fixture catalog references.
#[must_use]
pub fn all_templates() -> Vec<String> {
    let catalog = stages_catalog();
    catalog
        .stages
        .iter()
        .flat_map(|stage| stage.operations.iter().map(|op| op.name.clone()))
        .chain(catalog.hooks.values().cloned())
        .collect()
}

/// A product extracted under `/media/<name>-<version>` with a bare manifest.
#[must_use]
pub fn product(name: &str, version: &str) -> Product {
    Product::new(name, version)
        .with_location(format!("/media/{name}-{version}"))
        .with_manifest(format!("name: {name}\nversion: {version}\n"))
}

/// A product whose manifest declares a hook for `stage` and `phase`.
#[must_use]
pub fn product_with_hook(
    name: &str,
    version: &str,
    stage: &str,
    phase: &str,
    script_path: &str,
) -> Product {
    let stage_key = stage.replace('-', "_");
    product(name, version).with_manifest(format!(
        "name: {name}\nversion: {version}\nhooks:\n  {stage_key}:\n    {phase}:\n      script_path: {script_path}\n"
    ))
}

/// An activity with the given stages and products.
#[must_use]
pub fn activity(name: &str, stages: &[&str], products: Vec<Product>) -> Activity {
    let mut activity = Activity::new(
        name,
        InputParameters::with_stages(stages.iter().copied()).with_media_dir(format!("/media/{name}")),
    );
    activity.products = products;
    activity
}
