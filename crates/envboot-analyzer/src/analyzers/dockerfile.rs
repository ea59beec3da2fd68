//! Container build file analysis.

use std::sync::LazyLock;

use envboot_core::{Signal, SignalHit};
use regex::Regex;

use crate::source::{RepoEntry, RepoFileSource};

const CONTAINER_FILES: &[&str] = &["Dockerfile", "Containerfile"];

static FROM_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^FROM\s+(?:--platform=\S+\s+)?(\S+)").ok());

/// Base images named by `FROM` lines, in order.
pub fn base_images(content: &str) -> Vec<String> {
    let Some(from_re) = FROM_RE.as_ref() else {
        return vec![];
    };
    content
        .lines()
        .filter_map(|line| from_re.captures(line.trim()))
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Whether an image reference points at an NVIDIA/CUDA base.
pub fn is_gpu_image(image: &str) -> bool {
    let image = image.to_ascii_lowercase();
    image.contains("nvidia") || image.starts_with("nvcr.io/")
}

/// A root container build file whose base image is a GPU image.
pub fn check_gpu_base_image(source: &dyn RepoFileSource, entries: &[RepoEntry]) -> Option<SignalHit> {
    for entry in entries
        .iter()
        .filter(|e| e.is_at_root() && CONTAINER_FILES.contains(&e.path.as_str()))
    {
        let Some(content) = source.read_text(&entry.path) else {
            continue;
        };
        if let Some(image) = base_images(&content).into_iter().find(|i| is_gpu_image(i)) {
            return Some(SignalHit::new(
                Signal::GpuBaseImage,
                format!("{} FROM {image}", entry.path),
            ));
        }
    }
    None
}
