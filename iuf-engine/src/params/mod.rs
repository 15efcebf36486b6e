//! Global parameters handed to every task.
//!
//! The blob has four sections:
//! - `product_manifest`: the current product's parsed manifest
//! - `input_params`: admin inputs plus parsed bootprep files
//! - `site_params`: site configuration with a `current_product` alias
//! - `stage_params`: outputs of previous stages, reshaped per stage type

mod builder;
mod types;

pub use builder::{GlobalParamsBuilder, PROCESS_MEDIA_STAGE};
pub use types::{
    CurrentProduct, GlobalParams, InputParams, ProductManifestParams, SiteParams, StageParams,
};

use std::path::Path;

use crate::model::InputParameters;

/// Parsed bootprep files referenced by the input parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootprepContents {
    /// Managed-node bootprep document, or `null`.
    pub managed: serde_json::Value,
    /// Management-node bootprep document, or `null`.
    pub management: serde_json::Value,
}

/// Reads both bootprep files from under the media directory.
///
/// A file that is not configured, cannot be read or is not valid YAML
/// yields `null`.
pub async fn load_bootprep(input: &InputParameters) -> BootprepContents {
    BootprepContents {
        managed: read_bootprep(&input.media_dir, &input.bootprep_config_managed).await,
        management: read_bootprep(&input.media_dir, &input.bootprep_config_management).await,
    }
}

async fn read_bootprep(media_dir: &str, relative: &str) -> serde_json::Value {
    if relative.is_empty() {
        return serde_json::Value::Null;
    }

    let path = Path::new(media_dir).join(relative);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Cannot read bootprep file");
            return serde_json::Value::Null;
        }
    };

    serde_yaml::from_str(&text).unwrap_or_else(|err| {
        tracing::warn!(path = %path.display(), error = %err, "Bootprep file is not valid YAML");
        serde_json::Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_load_bootprep_from_media_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("managed.yaml"),
            "configurations:\n  - name: compute\n",
        )
        .unwrap();

        let mut input = InputParameters::default().with_media_dir(dir.path().to_string_lossy());
        input.bootprep_config_managed = "managed.yaml".to_string();
        input.bootprep_config_management = "missing.yaml".to_string();

        let contents = load_bootprep(&input).await;
        assert_eq!(
            contents.managed,
            json!({"configurations": [{"name": "compute"}]})
        );
        assert_eq!(contents.management, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_unconfigured_and_invalid_bootprep() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "a: [b").unwrap();

        let mut input = InputParameters::default().with_media_dir(dir.path().to_string_lossy());
        input.bootprep_config_management = "bad.yaml".to_string();

        assert_eq!(load_bootprep(&input).await, BootprepContents::default());
    }
}
