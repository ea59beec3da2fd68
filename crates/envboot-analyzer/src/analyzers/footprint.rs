//! Size and test/CI footprint signals.

use envboot_core::{Signal, SignalHit};

use super::Thresholds;
use crate::source::RepoEntry;

pub fn check_large_codebase(entries: &[RepoEntry], thresholds: &Thresholds) -> Option<SignalHit> {
    let visible = entries.iter().filter(|e| !e.file_name().starts_with('.'));
    let (files, lines) = visible.fold((0u64, 0u64), |(f, l), e| (f + 1, l + e.line_count));

    (files > thresholds.large_codebase_files || lines > thresholds.large_codebase_lines).then(|| {
        SignalHit::new(
            Signal::LargeCodebase,
            format!("{files} files, {lines} lines"),
        )
    })
}

pub fn check_large_files(entries: &[RepoEntry], thresholds: &Thresholds) -> Option<SignalHit> {
    let large: Vec<&RepoEntry> = entries
        .iter()
        .filter(|e| e.size_bytes > thresholds.large_file_bytes)
        .collect();
    let largest = large.iter().max_by_key(|e| e.size_bytes)?;
    Some(SignalHit::new(
        Signal::LargeFiles,
        format!(
            "{} file(s) over threshold, largest {} ({} bytes)",
            large.len(),
            largest.path,
            largest.size_bytes
        ),
    ))
}

/// Test sources and CI definitions.
pub fn is_test_or_ci(entry: &RepoEntry) -> bool {
    let name = entry.file_name();
    let path = entry.path.as_str();
    (name.contains("test") && name.ends_with(".py"))
        || path.starts_with("tests/")
        || path.contains("/tests/")
        || path.starts_with(".github/")
        || name.starts_with(".gitlab-ci")
        || name.ends_with(".yml")
}

pub fn check_test_footprint(entries: &[RepoEntry], thresholds: &Thresholds) -> Option<SignalHit> {
    let count = entries.iter().filter(|e| is_test_or_ci(e)).count() as u64;
    (count > thresholds.test_footprint_files)
        .then(|| SignalHit::new(Signal::TestFootprint, format!("{count} test/CI files")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::testing::FakeRepo;

    #[test]
    fn many_files_trip_large_codebase() {
        let mut repo = FakeRepo::default();
        for i in 0..501 {
            repo = repo.sized(&format!("src/f{i}.rs"), 10, 1);
        }
        let hit = check_large_codebase(&repo.entries, &Thresholds::default()).unwrap();
        assert!(hit.detail.starts_with("501 files"));
    }

    #[test]
    fn many_lines_trip_large_codebase() {
        let repo = FakeRepo::default().sized("big.c", 2_000_000, 50_001);
        assert!(check_large_codebase(&repo.entries, &Thresholds::default()).is_some());
    }

    #[test]
    fn dotfiles_do_not_count_toward_codebase_size() {
        let mut repo = FakeRepo::default();
        for i in 0..600 {
            repo = repo.sized(&format!(".cache{i}"), 10, 1);
        }
        assert!(check_large_codebase(&repo.entries, &Thresholds::default()).is_none());
    }

    #[test]
    fn oversized_file_fires_once() {
        let repo = FakeRepo::default()
            .sized("models/weights.bin", 600 * 1024 * 1024, 0)
            .sized("models/other.bin", 501 * 1024 * 1024, 0);
        let hit = check_large_files(&repo.entries, &Thresholds::default()).unwrap();
        assert_eq!(hit.points, 1);
        assert!(hit.detail.contains("models/weights.bin"));
    }

    #[test]
    fn file_at_threshold_is_not_large() {
        let repo = FakeRepo::default().sized("data.bin", 500 * 1024 * 1024, 0);
        assert!(check_large_files(&repo.entries, &Thresholds::default()).is_none());
    }

    #[test]
    fn test_footprint_counts_tests_and_ci() {
        let mut repo = FakeRepo::default()
            .sized(".github/workflows/ci.yml", 10, 1)
            .sized(".gitlab-ci.yml", 10, 1);
        for i in 0..48 {
            repo = repo.sized(&format!("tests/test_{i}.py"), 10, 1);
        }
        assert!(check_test_footprint(&repo.entries, &Thresholds::default()).is_none());

        repo = repo.sized("pkg/test_extra.py", 10, 1);
        let hit = check_test_footprint(&repo.entries, &Thresholds::default()).unwrap();
        assert_eq!(hit.detail, "51 test/CI files");
    }
}
