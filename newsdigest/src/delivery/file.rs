use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::info;

use super::DeliveryPort;
use crate::errors::DeliveryError;
use crate::render;
use crate::report::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Markdown,
    Html,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
        }
    }

    fn render(self, report: &Report) -> Result<String, DeliveryError> {
        Ok(match self {
            ReportFormat::Markdown => render::markdown(report),
            ReportFormat::Html => render::html(report),
            ReportFormat::Json => serde_json::to_string_pretty(report)?,
        })
    }
}

impl FromStr for ReportFormat {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "html" => Ok(ReportFormat::Html),
            "json" => Ok(ReportFormat::Json),
            other => Err(DeliveryError::Config(format!("unknown report format '{}'", other))),
        }
    }
}

/// Writes `report_YYYYMMDD.<ext>` into a directory, one file per format.
/// A later run on the same day overwrites the earlier files.
pub struct FileDelivery {
    output_dir: PathBuf,
    formats: Vec<ReportFormat>,
}

impl FileDelivery {
    pub fn new(output_dir: impl Into<PathBuf>, formats: Vec<ReportFormat>) -> Self {
        let formats = if formats.is_empty() {
            vec![ReportFormat::Markdown]
        } else {
            formats
        };
        Self {
            output_dir: output_dir.into(),
            formats,
        }
    }

    pub fn path_for(&self, report: &Report, format: ReportFormat) -> PathBuf {
        self.output_dir.join(format!(
            "report_{}.{}",
            report.period_end.format("%Y%m%d"),
            format.extension()
        ))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DeliveryError {
    DeliveryError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait::async_trait]
impl DeliveryPort for FileDelivery {
    fn name(&self) -> &str {
        "file"
    }

    async fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| io_error(&self.output_dir, e))?;

        for format in &self.formats {
            let path = self.path_for(report, *format);
            let content = format.render(report)?;
            tokio::fs::write(&path, content)
                .await
                .map_err(|e| io_error(&path, e))?;
            info!(path = %path.display(), "file: report written");
        }
        Ok(())
    }
}
