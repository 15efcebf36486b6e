//! Product manifest hook resolution.
//!
//! Product manifests are untrusted input. A manifest declares hook scripts
//! under `hooks.<stage>.<pre|post>`, with the stage name's hyphens written
//! as underscores:
//!
//! ```yaml
//! hooks:
//!   deliver_product:
//!     pre:
//!       script_path: hooks/pre-deliver.sh
//!       execution_context: master_host
//! ```
//!
//! Anything that does not match this shape means "no hook". A broken
//! manifest must never abort graph generation for the other products.

use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::model::Product;

/// Execution context used when a hook does not declare one.
pub const DEFAULT_EXECUTION_CONTEXT: &str = "master_host";

/// Whether a hook runs before or after the stage's operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// Before the first operation.
    Pre,
    /// After the last operation.
    Post,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// A hook script declared by a product manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookScript {
    /// Script path relative to the product's extraction directory.
    pub script_path: String,
    /// Where the script runs (e.g. `master_host`).
    pub execution_context: String,
}

/// Returns the manifest key for a stage name.
#[must_use]
pub fn manifest_stage_key(stage: &str) -> String {
    stage.replace('-', "_")
}

/// Resolves a hook from a manifest document.
///
/// Returns `None` when the hook is absent, the document is not valid YAML,
/// or any level of the path has the wrong shape.
#[must_use]
pub fn resolve_hook(manifest: &str, stage: &str, phase: HookPhase) -> Option<HookScript> {
    let document: Value = match serde_yaml::from_str(manifest) {
        Ok(document) => document,
        Err(err) => {
            tracing::warn!(stage, phase = %phase, error = %err, "Ignoring unparsable product manifest");
            return None;
        }
    };

    let hook = document
        .get("hooks")?
        .get(manifest_stage_key(stage))?
        .get(phase.to_string())?;

    let Some(script_path) = hook.get("script_path").and_then(Value::as_str) else {
        tracing::debug!(stage, phase = %phase, "Hook entry has no script_path");
        return None;
    };
    if script_path.is_empty() {
        return None;
    }

    let execution_context = hook
        .get("execution_context")
        .and_then(Value::as_str)
        .filter(|ctx| !ctx.is_empty())
        .unwrap_or(DEFAULT_EXECUTION_CONTEXT);

    Some(HookScript {
        script_path: script_path.to_string(),
        execution_context: execution_context.to_string(),
    })
}

/// Resolves a hook for every product, keyed by `<name>-<version>`.
///
/// Products without a hook for this stage and phase are left out.
#[must_use]
pub fn resolve_product_hooks(
    products: &[Product],
    stage: &str,
    phase: HookPhase,
) -> BTreeMap<String, HookScript> {
    products
        .iter()
        .filter_map(|product| {
            resolve_hook(&product.manifest, stage, phase).map(|hook| (product.key(), hook))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MANIFEST: &str = r"
name: cos
version: 2.5.0
hooks:
  deliver_product:
    pre:
      script_path: hooks/pre-deliver.sh
      execution_context: worker_host
    post:
      script_path: hooks/post-deliver.sh
  deploy_product: not-a-map
";

    #[test]
    fn test_resolves_pre_hook_with_context() {
        let hook = resolve_hook(MANIFEST, "deliver-product", HookPhase::Pre).unwrap();
        assert_eq!(hook.script_path, "hooks/pre-deliver.sh");
        assert_eq!(hook.execution_context, "worker_host");
    }

    #[test]
    fn test_post_hook_defaults_context() {
        let hook = resolve_hook(MANIFEST, "deliver-product", HookPhase::Post).unwrap();
        assert_eq!(hook.execution_context, DEFAULT_EXECUTION_CONTEXT);
    }

    #[test]
    fn test_missing_hook() {
        assert!(resolve_hook(MANIFEST, "process-media", HookPhase::Pre).is_none());
        assert!(resolve_hook("name: sdu\n", "deliver-product", HookPhase::Pre).is_none());
        assert!(resolve_hook("", "deliver-product", HookPhase::Pre).is_none());
    }

    #[test]
    fn test_scalar_hook_entry_is_ignored() {
        assert!(resolve_hook(MANIFEST, "deploy-product", HookPhase::Pre).is_none());
    }

    #[test]
    fn test_malformed_yaml_is_ignored() {
        let broken = "hooks: [unterminated";
        assert!(resolve_hook(broken, "deliver-product", HookPhase::Pre).is_none());
    }

    #[test]
    fn test_non_string_script_path_is_ignored() {
        let manifest = "hooks:\n  deliver_product:\n    pre:\n      script_path: [a, b]\n";
        assert!(resolve_hook(manifest, "deliver-product", HookPhase::Pre).is_none());
    }

    #[test]
    fn test_resolve_product_hooks_keys() {
        let products = vec![
            Product::new("cos", "2.5.0").with_manifest(MANIFEST),
            Product::new("sdu", "1.0.0").with_manifest("hooks: 7"),
        ];

        let hooks = resolve_product_hooks(&products, "deliver-product", HookPhase::Pre);
        assert_eq!(hooks.len(), 1);
        assert!(hooks.contains_key("cos-2.5.0"));
    }
}
