//! JSON report files, one per run, grouped by date.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Path for a report of `kind` taken at `now`: `{dir}/{date}/{kind}-{HHMMSS}.json`.
pub fn report_path(json_output_dir: &str, kind: &str, now: DateTime<Local>) -> PathBuf {
    PathBuf::from(json_output_dir)
        .join(now.format("%Y-%m-%d").to_string())
        .join(format!("{kind}-{}.json", now.format("%H%M%S")))
}

/// Serialize `report` as pretty JSON under the date directory and return the file path.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir, kind = %kind))]
pub async fn write_report<T: Serialize>(
    report: &T,
    kind: &str,
    json_output_dir: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;
    let path = report_path(json_output_dir, kind, Local::now());

    if let Some(dir) = path.parent() {
        info!(dir = %dir.display(), "Ensuring JSON directory exists");
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON report");
    Ok(path)
}
