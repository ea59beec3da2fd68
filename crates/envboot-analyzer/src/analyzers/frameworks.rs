//! GPU framework detection in dependency manifests.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use envboot_core::{Signal, SignalHit};
use regex::Regex;

use crate::source::{RepoEntry, RepoFileSource};

// Only the leading edge is bounded so distribution names such as
// torchvision, tensorflow_gpu and jaxlib still count.
static FRAMEWORK_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9_])(pytorch-lightning|torch|tensorflow|jax|cupy|cuda)").ok()
});

/// Manifests that declare Python/conda dependencies.
fn is_manifest(entry: &RepoEntry) -> bool {
    let name = entry.file_name();
    name == "pyproject.toml"
        || name == "setup.py"
        || name == "environment.yml"
        || name == "Pipfile"
        || (name.starts_with("requirements") && name.ends_with(".txt"))
}

/// Names of GPU frameworks mentioned in `text`, lowercased and deduplicated.
pub fn find_frameworks(text: &str) -> BTreeSet<String> {
    let Some(re) = FRAMEWORK_RE.as_ref() else {
        return BTreeSet::new();
    };
    re.captures_iter(text)
        .map(|caps| caps[1].to_ascii_lowercase())
        .collect()
}

pub fn check_gpu_frameworks(source: &dyn RepoFileSource, entries: &[RepoEntry]) -> Option<SignalHit> {
    let mut found = BTreeSet::new();
    for entry in entries.iter().filter(|e| !e.is_hidden() && is_manifest(e)) {
        if let Some(text) = source.read_text(&entry.path) {
            found.extend(find_frameworks(&text));
        }
    }

    if found.is_empty() {
        return None;
    }
    tracing::debug!(frameworks = ?found, "GPU frameworks detected");
    Some(SignalHit::new(
        Signal::GpuFramework,
        found.into_iter().collect::<Vec<_>>().join(", "),
    ))
}
