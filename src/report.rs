use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Envelope written to the metrics output file.
#[derive(Debug, Serialize)]
pub struct MetricsDocument<'a, T> {
    pub command: &'a str,
    pub generated_at: DateTime<Utc>,
    pub result: &'a T,
}

/// Write a run result as pretty JSON, creating parent directories as needed.
pub fn write_metrics<T: Serialize>(path: &Path, command: &str, result: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create metrics directory {parent:?}"))?;
    }

    let document = MetricsDocument {
        command,
        generated_at: Utc::now(),
        result,
    };
    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write metrics to {path:?}"))?;

    info!("Metrics written to {:?}", path);
    Ok(())
}
