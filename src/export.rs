//! Export of reconciled sessions to CSV, JSON or JSON Lines.

use crate::core::{AttendanceSession, DateRange};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Jsonl,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Jsonl => "jsonl",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "jsonl" => Ok(ExportFormat::Jsonl),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Export errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export format not supported: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Flat row written to CSV.
#[derive(Debug, Serialize)]
struct SessionRow<'a> {
    user_id: &'a str,
    user_name: &'a str,
    date: String,
    check_in: Option<String>,
    check_out: Option<String>,
    duration: Option<String>,
}

impl<'a> From<&'a AttendanceSession> for SessionRow<'a> {
    fn from(session: &'a AttendanceSession) -> Self {
        Self {
            user_id: &session.user_id,
            user_name: &session.user_name,
            date: session.date.to_string(),
            check_in: session.check_in.map(|t| t.format(TIME_FORMAT).to_string()),
            check_out: session.check_out.map(|t| t.format(TIME_FORMAT).to_string()),
            duration: session.duration_hours.map(|h| format!("{h:.2}")),
        }
    }
}

/// Default file name for an export of `range`.
pub fn default_file_name(range: Option<DateRange>, format: ExportFormat) -> String {
    match range {
        Some(r) => format!(
            "attendance_records_{}_{}.{}",
            r.start,
            r.end,
            format.extension()
        ),
        None => format!("attendance_records.{}", format.extension()),
    }
}

/// Write sessions to `path` in the given format.
pub fn export_sessions(
    sessions: &[AttendanceSession],
    path: &Path,
    format: ExportFormat,
) -> Result<PathBuf, ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    match format {
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_path(path)?;
            for session in sessions {
                writer.serialize(SessionRow::from(session))?;
            }
            writer.flush()?;
        }
        ExportFormat::Json => {
            let json = serde_json::to_string_pretty(sessions)?;
            File::create(path)?.write_all(json.as_bytes())?;
        }
        ExportFormat::Jsonl => {
            let mut file = File::create(path)?;
            for session in sessions {
                serde_json::to_writer(&mut file, session)?;
                file.write_all(b"\n")?;
            }
        }
    }

    tracing::info!(path = ?path, sessions = sessions.len(), "Exported attendance records");
    Ok(path.to_path_buf())
}
