//! Human-readable report formatting.

use envboot_core::ScoreReport;

pub fn format_report(report: &ScoreReport) -> String {
    let mut out = String::new();
    let defaults = report.tier.default_request();
    let tier_label = if report.tier_overridden {
        format!("{} (override)", report.tier)
    } else {
        report.tier.to_string()
    };

    out.push_str("\n╔══════════════════════════════════════════╗\n");
    out.push_str("║  envboot Complexity Analysis             ║\n");
    out.push_str("╠══════════════════════════════════════════╣\n");
    out.push_str(&format!("║  Repo:   {:<31}║\n", report.root));
    out.push_str(&format!("║  Score:  {:<31}║\n", report.score));
    out.push_str(&format!("║  Tier:   {:<31}║\n", tier_label));
    out.push_str("╚══════════════════════════════════════════╝\n\n");

    out.push_str(&format!(
        "Files: {} ({} lines)\n\n",
        report.total_files, report.total_lines
    ));

    if report.signals.is_empty() {
        out.push_str("No complexity signals.\n\n");
    } else {
        out.push_str("SIGNALS:\n\n");
        for hit in &report.signals {
            out.push_str(&format!(
                "  +{} {:?}: {}\n",
                hit.points, hit.signal, hit.detail
            ));
        }
        out.push('\n');
    }

    out.push_str("DEFAULT REQUEST:\n\n");
    out.push_str(&format!("  vCPUs:      {}\n", defaults.vcpus));
    out.push_str(&format!("  RAM:        {} GB\n", defaults.ram_gb));
    out.push_str(&format!("  GPUs:       {}\n", defaults.gpus));
    out.push_str(&format!(
        "  Platform:   {}\n",
        if defaults.bare_metal { "bare metal" } else { "KVM" }
    ));
    out.push_str(&format!("  Duration:   {} h\n", defaults.duration_hours));
    out.push_str(&format!("\nFingerprint: {}\n", report.fingerprint));

    out
}
