use std::path::Path;

use chrono::{DateTime, Utc};
use envboot_core::time::format_timestamp;
use envboot_scheduler::{ZoneSummary, zone_summary};

pub fn zones(snapshot: &Path, at: Option<DateTime<Utc>>, format: &str) -> anyhow::Result<()> {
    let snapshot = super::load_snapshot(snapshot)?;
    let at = at.unwrap_or_else(|| snapshot.as_of());
    let summary = zone_summary(&snapshot, at);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print!("{}", format_table(&summary, at)),
    }
    Ok(())
}

fn format_table(summary: &[ZoneSummary], at: DateTime<Utc>) -> String {
    let mut out = format!("Zones at {}\n\n", format_timestamp(&at));
    out.push_str(&format!(
        "  {:<16} {:>6} {:>6} {:>8}\n",
        "ZONE", "TOTAL", "FREE", "WINDOWS"
    ));
    for zone in summary {
        out.push_str(&format!(
            "  {:<16} {:>6} {:>6} {:>8}\n",
            zone.zone, zone.total_nodes, zone.free_nodes, zone.windows
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn table_lists_each_zone() {
        let at = Utc.with_ymd_and_hms(2025, 9, 2, 0, 0, 0).unwrap();
        let summary = vec![
            ZoneSummary {
                zone: "tacc".to_string(),
                total_nodes: 8,
                free_nodes: 8,
                windows: 0,
            },
            ZoneSummary {
                zone: "uc".to_string(),
                total_nodes: 132,
                free_nodes: 127,
                windows: 5,
            },
        ];
        let table = format_table(&summary, at);
        assert!(table.starts_with("Zones at 2025-09-02T00:00:00Z"));
        assert_eq!(table.lines().count(), 5);
        assert!(table.contains("uc"));
        assert!(table.contains("127"));
    }
}
