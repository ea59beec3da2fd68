//! envboot-analyzer - deterministic repository complexity scoring.
//!
//! A scan lists the repository through [`RepoFileSource`], runs the fixed
//! set of signal checks in [`analyzers`], sums their points, and maps the
//! score onto a [`ComplexityTier`]. Scanning the same content twice always
//! yields the same score, tier, and fingerprint.

pub mod analyzers;
pub mod report;
pub mod source;

use std::path::Path;

use envboot_core::{ComplexityTier, EngineResult, ScoreReport, Signal};
use sha2::{Digest, Sha256};

pub use analyzers::Thresholds;
pub use source::{FsRepoSource, RepoEntry, RepoFileSource};

/// Score a repository on the local filesystem with default thresholds.
pub fn score_path(path: &Path) -> EngineResult<ScoreReport> {
    let source = FsRepoSource::open(path)?;
    score_repository(&source, &Thresholds::default())
}

/// Score any repository source.
pub fn score_repository(
    source: &dyn RepoFileSource,
    thresholds: &Thresholds,
) -> EngineResult<ScoreReport> {
    let entries = source.entries()?;
    let signals = analyzers::run_checks(source, &entries, thresholds);

    let score: u32 = signals.iter().map(|hit| hit.points).sum();
    let tier = ComplexityTier::from_score(score);
    let gpu_framework_detected = signals.iter().any(|hit| hit.signal == Signal::GpuFramework);

    tracing::info!(
        root = %source.root_name(),
        score,
        tier = %tier,
        signals = signals.len(),
        "scored repository"
    );

    Ok(ScoreReport {
        root: source.root_name(),
        score,
        tier,
        tier_overridden: false,
        signals,
        gpu_framework_detected,
        total_files: entries.len() as u64,
        total_lines: entries.iter().map(|e| e.line_count).sum(),
        fingerprint: fingerprint(&entries),
    })
}

/// Apply a caller's tier override to a report.
///
/// The override must name one of the four tiers; anything else fails with
/// `InvalidComplexityOverride`. The score itself is left untouched.
pub fn apply_tier_override(
    mut report: ScoreReport,
    tier_override: Option<&str>,
) -> EngineResult<ScoreReport> {
    if let Some(raw) = tier_override {
        let tier: ComplexityTier = raw.parse()?;
        if tier != report.tier {
            tracing::info!(scored = %report.tier, forced = %tier, "complexity tier overridden");
        }
        report.tier = tier;
        report.tier_overridden = true;
    }
    Ok(report)
}

fn fingerprint(entries: &[RepoEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.path.as_bytes());
        hasher.update([0u8]);
        hasher.update(entry.size_bytes.to_le_bytes());
        hasher.update(entry.line_count.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}
