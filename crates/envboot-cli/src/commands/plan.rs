use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;
use envboot_core::CaseKind;
use envboot_downgrade::{ShellSmokeTest, SmokeTestExecutor, StaticSmokeTest};
use envboot_orchestrator::{AuditLog, AuditRecord, CaseInputs, CaseOrchestrator, SimulatedBackend};
use tracing::info;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Case flow: base, limited, downgrade or complexity
    #[arg(short, long)]
    pub case: CaseKind,
    /// Allocation snapshot (JSON)
    #[arg(short, long)]
    pub snapshot: PathBuf,
    /// Repository to score
    #[arg(short, long, default_value = ".")]
    pub repo: PathBuf,
    /// envboot.toml (default: built-in defaults)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Force a complexity tier instead of the scored one
    #[arg(long)]
    pub tier: Option<String>,
    /// Override the tier's default duration, in hours
    #[arg(long)]
    pub duration: Option<f64>,
    /// Number of nodes to reserve
    #[arg(long, default_value_t = 1)]
    pub nodes: u32,
    /// Requested start (default: the snapshot's as-of time)
    #[arg(long, value_parser = super::parse_time)]
    pub start: Option<DateTime<Utc>>,
    /// Deadline the reservation should start by
    #[arg(long, value_parser = super::parse_time)]
    pub start_by: Option<DateTime<Utc>>,
    /// Zone to try first (default: scheduling.preferred_zone)
    #[arg(long)]
    pub zone: Option<String>,
    /// Command that validates a downgraded profile
    #[arg(long)]
    pub smoke_cmd: Option<String>,
    /// Lease name passed to the backend
    #[arg(long)]
    pub lease_name: Option<String>,
    /// Plan without creating a lease
    #[arg(long)]
    pub dry_run: bool,
    /// Append a JSON line per created lease to this file
    #[arg(long)]
    pub audit: Option<PathBuf>,
}

impl PlanArgs {
    fn inputs(&self) -> CaseInputs {
        CaseInputs {
            repo_path: self.repo.clone(),
            tier_override: self.tier.clone(),
            duration_override_hours: self.duration,
            node_count: self.nodes,
            start: self.start,
            start_by: self.start_by,
            smoke_command: self.smoke_cmd.clone(),
            zone: self.zone.clone(),
            lease_name: self.lease_name.clone(),
            dry_run: self.dry_run,
        }
    }
}

pub fn plan(args: &PlanArgs) -> anyhow::Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let snapshot = super::load_snapshot(&args.snapshot)?;
    let mut backend = SimulatedBackend::new(snapshot.clone());

    // Dry runs never execute the smoke command.
    let shell = ShellSmokeTest::from_config(&config.smoke_test);
    let fixed = StaticSmokeTest::passing();
    let smoke: &dyn SmokeTestExecutor = if args.dry_run { &fixed } else { &shell };

    let result = CaseOrchestrator::new(&config, &snapshot, &mut backend)
        .with_smoke_test(smoke)
        .run(args.case, &args.inputs())?;

    if let Some(path) = &args.audit {
        if let Some(record) = AuditRecord::from_result(&result, Utc::now()) {
            AuditLog::new(path).append(&record)?;
            info!(path = %path.display(), lease_id = %record.lease_id, "audit record written");
        }
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        plan: PlanArgs,
    }

    #[test]
    fn parses_flags_into_case_inputs() {
        let cli = TestCli::try_parse_from([
            "envboot",
            "--case",
            "limited",
            "--snapshot",
            "alloc.json",
            "--nodes",
            "3",
            "--start",
            "2025-09-02 10:00",
            "--zone",
            "tacc",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.plan.case, CaseKind::Limited);
        let inputs = cli.plan.inputs();
        assert_eq!(inputs.node_count, 3);
        assert_eq!(inputs.zone.as_deref(), Some("tacc"));
        assert_eq!(
            inputs.start.map(|t| envboot_core::time::format_timestamp(&t)),
            Some("2025-09-02T10:00:00Z".to_string())
        );
        assert!(inputs.dry_run);
        assert_eq!(inputs.repo_path, PathBuf::from("."));
    }

    #[test]
    fn rejects_unknown_case() {
        assert!(TestCli::try_parse_from(["envboot", "--case", "fastest", "--snapshot", "a.json"]).is_err());
    }

    #[test]
    fn dry_run_plan_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "print(1)\n").unwrap();
        let snapshot = dir.path().join("alloc.json");
        std::fs::write(
            &snapshot,
            r#"{"as_of": "2025-09-02T00:00:00Z", "zones": {"current": {"total_nodes": 2}}}"#,
        )
        .unwrap();
        let audit = dir.path().join("audit.jsonl");

        let repo = dir.path().to_str().unwrap();
        let snap = snapshot.to_str().unwrap();
        let audit_arg = audit.to_str().unwrap();
        let cli = TestCli::try_parse_from([
            "envboot", "--case", "complexity", "--snapshot", snap, "--repo", repo, "--dry-run",
            "--audit", audit_arg,
        ])
        .unwrap();

        plan(&cli.plan).unwrap();
        assert!(!audit.exists());
    }
}
