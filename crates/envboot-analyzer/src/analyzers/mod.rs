//! Signal checks.
//!
//! Each check is a pure function over the file listing (plus manifest text
//! where needed) and returns the hit it raised, if any.

pub mod dockerfile;
pub mod footprint;
pub mod frameworks;

use envboot_core::{Signal, SignalHit};

use crate::source::{RepoEntry, RepoFileSource};

/// Thresholds for the size and footprint signals.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub large_codebase_files: u64,
    pub large_codebase_lines: u64,
    pub large_file_bytes: u64,
    pub test_footprint_files: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            large_codebase_files: 500,
            large_codebase_lines: 50_000,
            large_file_bytes: 500 * 1024 * 1024,
            test_footprint_files: 50,
        }
    }
}

const KERNEL_EXTENSIONS: &[&str] = &["cu", "cuh"];
const BUILD_FILES: &[&str] = &["Dockerfile", "Makefile", "CMakeLists.txt"];

/// Run every check, in a fixed order.
pub fn run_checks(
    source: &dyn RepoFileSource,
    entries: &[RepoEntry],
    thresholds: &Thresholds,
) -> Vec<SignalHit> {
    [
        frameworks::check_gpu_frameworks(source, entries),
        check_kernel_sources(entries),
        dockerfile::check_gpu_base_image(source, entries),
        check_build_system(entries),
        footprint::check_large_codebase(entries, thresholds),
        footprint::check_large_files(entries, thresholds),
        footprint::check_test_footprint(entries, thresholds),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// GPU-kernel sources anywhere in the tree.
pub fn check_kernel_sources(entries: &[RepoEntry]) -> Option<SignalHit> {
    let kernels = entries
        .iter()
        .filter(|e| e.extension().is_some_and(|ext| KERNEL_EXTENSIONS.contains(&ext)))
        .count();
    (kernels > 0).then(|| SignalHit::new(Signal::GpuKernelSources, format!("{kernels} kernel source file(s)")))
}

/// Build-system files at the repository root.
pub fn check_build_system(entries: &[RepoEntry]) -> Option<SignalHit> {
    let found: Vec<&str> = entries
        .iter()
        .filter(|e| e.is_at_root() && BUILD_FILES.contains(&e.path.as_str()))
        .map(|e| e.path.as_str())
        .collect();
    (!found.is_empty()).then(|| SignalHit::new(Signal::BuildSystem, found.join(", ")))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use envboot_core::EngineResult;

    use crate::source::{RepoEntry, RepoFileSource};

    /// In-memory repository for exercising checks without touching disk.
    #[derive(Default)]
    pub struct FakeRepo {
        pub entries: Vec<RepoEntry>,
        pub texts: HashMap<String, String>,
    }

    impl FakeRepo {
        pub fn file(mut self, path: &str, content: &str) -> Self {
            self.entries.push(RepoEntry {
                path: path.to_string(),
                size_bytes: content.len() as u64,
                line_count: content.lines().count() as u64,
            });
            self.texts.insert(path.to_string(), content.to_string());
            self
        }

        pub fn sized(mut self, path: &str, size_bytes: u64, line_count: u64) -> Self {
            self.entries.push(RepoEntry {
                path: path.to_string(),
                size_bytes,
                line_count,
            });
            self
        }
    }

    impl RepoFileSource for FakeRepo {
        fn root_name(&self) -> String {
            "fake".to_string()
        }

        fn entries(&self) -> EngineResult<Vec<RepoEntry>> {
            let mut entries = self.entries.clone();
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(entries)
        }

        fn read_text(&self, path: &str) -> Option<String> {
            self.texts.get(path).cloned()
        }
    }
}
