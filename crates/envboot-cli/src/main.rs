use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use envboot_core::EngineError;

mod commands;

#[derive(Parser)]
#[command(
    name = "envboot",
    about = "envboot - capacity-aware reservation planning",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a repository and show its complexity tier
    Analyze {
        /// Repository directory
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Run a case flow against an allocation snapshot.
    ///
    /// Leases are created on a simulated backend seeded from the snapshot.
    /// The case result is printed as JSON on stdout.
    Plan(commands::plan::PlanArgs),
    /// List zones with total and free node counts
    Zones {
        /// Allocation snapshot (JSON)
        #[arg(short, long)]
        snapshot: PathBuf,
        /// Instant to evaluate (default: the snapshot's as-of time)
        #[arg(long, value_parser = commands::parse_time)]
        at: Option<chrono::DateTime<chrono::Utc>>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print the effective configuration as TOML
    Config {
        /// envboot.toml to load (default: built-in defaults)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "envboot=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Analyze { path, format } => commands::analyze::analyze(&path, &format),
        Commands::Plan(args) => commands::plan::plan(&args),
        Commands::Zones { snapshot, at, format } => commands::zones::zones(&snapshot, at, &format),
        Commands::Config { config } => commands::config::show(config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code(&err)
        }
    }
}

/// 2 for lease backend failures, 1 for everything else.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<EngineError>() {
        Some(e) if e.is_backend() => ExitCode::from(2),
        _ => ExitCode::from(1),
    }
}
