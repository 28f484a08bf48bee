use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::info;

use crate::pipeline::Report;

pub fn report_file_name(report: &Report, now: DateTime<Local>) -> String {
    format!(
        "foodhunter_report_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        report.format.extension()
    )
}

/// Writes the report into `dir` under a timestamped name and returns the path.
pub fn save_report(dir: &Path, report: &Report, now: DateTime<Local>) -> Result<PathBuf> {
    let path = dir.join(report_file_name(report, now));
    std::fs::write(&path, &report.content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!(path = %path.display(), "Report saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::OutputFormat;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn report(format: OutputFormat) -> Report {
        Report {
            query: "q".to_string(),
            evidence: Vec::new(),
            format,
            content: "# 💡 餐饮情报分析报告".to_string(),
        }
    }

    #[test]
    fn test_file_name_is_timestamped() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 8, 30, 5).unwrap();
        assert_eq!(
            report_file_name(&report(OutputFormat::Markdown), now),
            "foodhunter_report_20240501_083005.md"
        );
        assert_eq!(
            report_file_name(&report(OutputFormat::Html), now),
            "foodhunter_report_20240501_083005.html"
        );
    }

    #[test]
    fn test_save_report_writes_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = save_report(temp_dir.path(), &report(OutputFormat::Markdown), Local::now()).unwrap();
        assert!(path.starts_with(temp_dir.path()));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# 💡 餐饮情报分析报告");
    }

    #[test]
    fn test_save_report_missing_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        assert!(save_report(&missing, &report(OutputFormat::Html), Local::now()).is_err());
    }
}
