//! Task naming and hook script path resolution.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use crate::errors::PathTraversalError;
use crate::manifest::HookPhase;

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9-]+").expect("task name pattern is valid"));

/// Length of the hash suffix appended to truncated names.
const HASH_SUFFIX_LEN: usize = 8;

/// Shortest limit that still leaves room for a prefix, `-` and the hash.
pub const MIN_TASK_NAME_LEN: usize = HASH_SUFFIX_LEN + 2;

/// Converts a raw name into an engine-safe task identifier.
///
/// The result is lowercase, contains only `[a-z0-9-]`, and never starts or
/// ends with `-`. Names longer than `max_len` keep a prefix and gain a short
/// hash of the raw name so distinct inputs stay distinct.
#[must_use]
pub fn sanitize_task_name(raw: &str, max_len: usize) -> String {
    let lowered = raw.to_lowercase();
    let replaced = INVALID_CHARS.replace_all(&lowered, "-");
    let name = replaced.trim_matches('-');

    if name.len() <= max_len {
        return name.to_string();
    }

    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    let keep = max_len.saturating_sub(HASH_SUFFIX_LEN + 1);
    let prefix = name[..keep].trim_end_matches('-');
    if prefix.is_empty() {
        return digest[..max_len.clamp(1, HASH_SUFFIX_LEN)].to_string();
    }
    format!("{prefix}-{}", &digest[..HASH_SUFFIX_LEN])
}

/// Returns the raw (unsanitized) name of a hook task.
#[must_use]
pub fn hook_task_name(product_key: &str, phase: HookPhase, stage: &str) -> String {
    format!("{product_key}-{phase}-hook-{stage}")
}

/// Returns the raw name of an operation task.
///
/// Product stages prefix the product key; global stages use the operation
/// name alone.
#[must_use]
pub fn operation_task_name(product_key: Option<&str>, operation: &str) -> String {
    match product_key {
        Some(key) => format!("{key}-{operation}"),
        None => operation.to_string(),
    }
}

/// Joins a manifest-declared script path onto a product directory.
///
/// The join is lexical: `..` and `.` are resolved without touching the
/// filesystem and a leading `/` in `script_path` is treated as relative.
/// The result must stay inside `original_location`.
pub fn resolve_script_path(
    product: &str,
    original_location: &str,
    script_path: &str,
) -> Result<PathBuf, PathTraversalError> {
    let root = clean(Path::new(original_location));
    let relative = Path::new(script_path)
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)));
    let resolved = clean(&root.join(relative.collect::<PathBuf>()));

    let escapes = original_location.is_empty()
        || resolved.components().any(|c| c == Component::ParentDir)
        || !resolved.starts_with(&root)
        || resolved == root;

    if escapes {
        return Err(PathTraversalError {
            product: product.to_string(),
            script_path: script_path.to_string(),
            resolved,
            root,
        });
    }
    Ok(resolved)
}

fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}
