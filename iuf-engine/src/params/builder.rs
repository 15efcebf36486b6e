//! Global parameter assembly.

use std::collections::BTreeMap;

use super::{
    BootprepContents, CurrentProduct, GlobalParams, InputParams, ProductManifestParams,
    SiteParams, StageParams,
};
use crate::catalog::{StageType, StagesCatalog};
use crate::model::{JsonMap, OperationOutputs, Product, Session, StageOutputRecord};

/// Stage whose outputs are always keyed per product.
pub const PROCESS_MEDIA_STAGE: &str = "process-media";

/// Builds the global parameters blob for tasks of one session.
///
/// The builder is a pure function of its inputs; bootprep files are read by
/// the caller beforehand.
#[derive(Debug, Clone, Copy)]
pub struct GlobalParamsBuilder<'a> {
    session: &'a Session,
    outputs: &'a OperationOutputs,
    catalog: &'a StagesCatalog,
    bootprep: &'a BootprepContents,
    process_media_stage: &'a str,
}

impl<'a> GlobalParamsBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub fn new(
        session: &'a Session,
        outputs: &'a OperationOutputs,
        catalog: &'a StagesCatalog,
        bootprep: &'a BootprepContents,
    ) -> Self {
        Self {
            session,
            outputs,
            catalog,
            bootprep,
            process_media_stage: PROCESS_MEDIA_STAGE,
        }
    }

    /// Overrides the name of the media processing stage.
    #[must_use]
    pub fn with_process_media_stage(mut self, stage: &'a str) -> Self {
        self.process_media_stage = stage;
        self
    }

    /// Builds the blob for `product`, or the product-less variant for `None`.
    #[must_use]
    pub fn build(&self, product: Option<&Product>) -> GlobalParams {
        GlobalParams {
            product_manifest: Self::product_manifest(product),
            input_params: self.input_params(),
            site_params: self.site_params(product),
            stage_params: self.stage_params(product),
        }
    }

    /// Builds the blob for every session product, keyed by product key.
    #[must_use]
    pub fn build_per_product(&self) -> BTreeMap<String, GlobalParams> {
        self.session
            .products
            .iter()
            .map(|product| (product.key(), self.build(Some(product))))
            .collect()
    }

    fn product_manifest(product: Option<&Product>) -> ProductManifestParams {
        let current_product = product.map(|product| {
            let manifest = match serde_yaml::from_str::<serde_json::Value>(&product.manifest) {
                Ok(manifest) => manifest,
                Err(err) => {
                    tracing::warn!(
                        product = %product.key(),
                        error = %err,
                        "Product manifest is not valid YAML; passing null"
                    );
                    serde_json::Value::Null
                }
            };
            CurrentProduct {
                name: product.name.clone(),
                version: product.version.clone(),
                original_location: product.original_location.clone(),
                manifest,
            }
        });

        ProductManifestParams { current_product }
    }

    fn input_params(&self) -> InputParams {
        let input = &self.session.input_parameters;
        InputParams {
            products: self.session.products.iter().map(Product::key).collect(),
            media_dir: input.media_dir.clone(),
            media_host: input.media_host.clone(),
            bootprep_config_managed: self.bootprep.managed.clone(),
            bootprep_config_management: self.bootprep.management.clone(),
            limit_management_nodes: input.limit_management_nodes.clone(),
            limit_managed_nodes: input.limit_managed_nodes.clone(),
            managed_rollout_strategy: input.managed_rollout_strategy,
            concurrent_management_rollout_percentage: input
                .concurrent_management_rollout_percentage,
            concurrency: input.concurrency,
            force: input.force,
        }
    }

    fn site_params(&self, product: Option<&Product>) -> SiteParams {
        let (global, products) = self.session.site_parameters.resolved();
        let current_product = product.and_then(|p| products.get(&p.name).cloned());
        SiteParams {
            global,
            products,
            current_product,
        }
    }

    fn stage_params(&self, product: Option<&Product>) -> BTreeMap<String, StageParams> {
        let current_key = product.map(Product::key);

        self.outputs
            .iter()
            .map(|(stage, record)| {
                let per_product = stage == self.process_media_stage
                    || self.catalog.stage_type(stage) == Some(StageType::Product);

                let params = match record {
                    StageOutputRecord::Product(output) if per_product => StageParams::Product {
                        products: output.products.clone(),
                        current_product: current_key
                            .as_ref()
                            .and_then(|key| output.products.get(key).cloned()),
                    },
                    StageOutputRecord::Product(output) => StageParams::Global {
                        global: output
                            .products
                            .iter()
                            .map(|(key, values)| {
                                (key.clone(), serde_json::Value::Object(values.clone()))
                            })
                            .collect::<JsonMap>(),
                    },
                    StageOutputRecord::Global(output) => StageParams::Global {
                        global: output.global.clone(),
                    },
                };

                (stage.clone(), params)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Stage;
    use crate::model::{Activity, InputParameters};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn map(value: serde_json::Value) -> JsonMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn catalog() -> StagesCatalog {
        StagesCatalog::new(vec![
            Stage::new(PROCESS_MEDIA_STAGE, StageType::Global),
            Stage::new("pre-install-check", StageType::Global),
            Stage::new("deliver-product", StageType::Product),
        ])
    }

    fn session() -> Session {
        let mut activity = Activity::new(
            "a1",
            InputParameters::with_stages(["deliver-product"]).with_media_dir("/media/a1"),
        );
        activity.products = vec![
            Product::new("cos", "2.5.0")
                .with_location("/media/a1/cos")
                .with_manifest("name: cos\nversion: 2.5.0\ncontent:\n  docker: []\n"),
            Product::new("sdu", "1.0.0").with_manifest(": : not yaml"),
        ];
        activity
            .site_parameters
            .products
            .insert("cos".to_string(), map(json!({"vcs_branch": "integration"})));
        activity
            .site_parameters
            .global
            .insert("vcs_host".to_string(), json!("api-gw"));
        Session::from_activity("a1-s1", &activity)
    }

    fn outputs() -> OperationOutputs {
        let mut outputs = OperationOutputs::new();
        let media = outputs.product_stage_mut(PROCESS_MEDIA_STAGE);
        media.merge_product("cos-2.5.0", map(json!({"parent_directory": "/media/a1/cos"})));
        media.merge_product("sdu-1.0.0", map(json!({"parent_directory": "/media/a1/sdu"})));
        outputs
            .global_stage_mut("pre-install-check")
            .merge(map(json!({"nodes_ok": "true"})));
        outputs
            .product_stage_mut("deliver-product")
            .merge_product("cos-2.5.0", map(json!({"loftsman": {"uploaded": "yes"}})));
        outputs
    }

    #[test]
    fn test_product_manifest_section() {
        let session = session();
        let outputs = OperationOutputs::new();
        let catalog = catalog();
        let bootprep = BootprepContents::default();
        let builder = GlobalParamsBuilder::new(&session, &outputs, &catalog, &bootprep);

        let params = builder.build(Some(&session.products[0]));
        let current = params.product_manifest.current_product.unwrap();
        assert_eq!(current.name, "cos");
        assert_eq!(current.manifest["content"], json!({"docker": []}));

        let broken = builder.build(Some(&session.products[1]));
        assert_eq!(
            broken.product_manifest.current_product.unwrap().manifest,
            serde_json::Value::Null
        );
    }

    #[test]
    fn test_site_params_current_product_alias() {
        let session = session();
        let outputs = OperationOutputs::new();
        let catalog = catalog();
        let bootprep = BootprepContents::default();
        let builder = GlobalParamsBuilder::new(&session, &outputs, &catalog, &bootprep);

        let cos = builder.build(Some(&session.products[0]));
        assert_eq!(
            cos.site_params.current_product,
            Some(map(json!({"vcs_branch": "integration"})))
        );
        assert_eq!(cos.site_params.global["vcs_host"], json!("api-gw"));

        let sdu = builder.build(Some(&session.products[1]));
        assert!(sdu.site_params.current_product.is_none());
    }

    #[test]
    fn test_stage_params_reshaped_per_stage_type() {
        let session = session();
        let outputs = outputs();
        let catalog = catalog();
        let bootprep = BootprepContents::default();
        let builder = GlobalParamsBuilder::new(&session, &outputs, &catalog, &bootprep);

        let params = builder.build(Some(&session.products[0]));

        match &params.stage_params[PROCESS_MEDIA_STAGE] {
            StageParams::Product {
                products,
                current_product,
            } => {
                assert_eq!(products.len(), 2);
                assert_eq!(
                    current_product.as_ref().unwrap()["parent_directory"],
                    json!("/media/a1/cos")
                );
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            params.stage_params["pre-install-check"],
            StageParams::Global {
                global: map(json!({"nodes_ok": "true"}))
            }
        );

        let sdu = builder.build(Some(&session.products[1]));
        let StageParams::Product {
            current_product, ..
        } = &sdu.stage_params["deliver-product"]
        else {
            panic!("expected product params");
        };
        assert!(current_product.is_none());
    }

    #[test]
    fn test_product_less_variant() {
        let session = session();
        let outputs = outputs();
        let catalog = catalog();
        let bootprep = BootprepContents::default();
        let builder = GlobalParamsBuilder::new(&session, &outputs, &catalog, &bootprep);

        let params = builder.build(None);
        assert!(params.product_manifest.current_product.is_none());
        assert!(params.site_params.current_product.is_none());
        assert_eq!(params.input_params.products, vec!["cos-2.5.0", "sdu-1.0.0"]);
        assert_eq!(params.input_params.media_dir, "/media/a1");
    }

    #[test]
    fn test_serialized_shape() {
        let session = session();
        let outputs = outputs();
        let catalog = catalog();
        let bootprep = BootprepContents::default();
        let builder = GlobalParamsBuilder::new(&session, &outputs, &catalog, &bootprep);

        let value = serde_json::to_value(builder.build(Some(&session.products[0]))).unwrap();
        assert_eq!(
            value["stage_params"]["pre-install-check"],
            json!({"global": {"nodes_ok": "true"}})
        );
        assert_eq!(
            value["stage_params"]["deliver-product"]["current_product"],
            json!({"loftsman": {"uploaded": "yes"}})
        );

        let back: GlobalParams = serde_json::from_value(value).unwrap();
        assert_eq!(back.product_key().as_deref(), Some("cos-2.5.0"));
    }
}
