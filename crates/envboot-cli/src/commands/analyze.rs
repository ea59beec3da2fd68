use std::path::Path;

pub fn analyze(path: &Path, format: &str) -> anyhow::Result<()> {
    let report = envboot_analyzer::score_path(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!("{}", envboot_analyzer::report::format_report(&report));
        }
    }

    Ok(())
}
