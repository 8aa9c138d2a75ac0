use anyhow::Result;
use std::fmt::Write;
use std::path::Path;

use crate::cli::ReportFormat;
use crate::jobs::{Job, JobStatus};
use crate::utils::format_file_size;

/// Render a job's status record
pub fn format_report(job: &Job, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(job)?),
        ReportFormat::Text => Ok(format_as_text(job)),
    }
}

/// Print a job's status record to stdout
pub fn print_report(job: &Job, format: ReportFormat) -> Result<()> {
    println!("{}", format_report(job, format)?);
    Ok(())
}

fn format_as_text(job: &Job) -> String {
    let mut out = String::new();

    match (job.status(), job.result(), job.error()) {
        (JobStatus::Done, Some(result), _) => {
            let _ = writeln!(out, "Job {} done", job.id());
            let _ = writeln!(out, "  Title: {}", result.metadata.title);
            if let Some(uploader) = &result.metadata.uploader {
                let _ = writeln!(out, "  Uploader: {}", uploader);
            }
            let _ = writeln!(
                out,
                "  Segment: {} ({}s, {})",
                result.range,
                result.range.length_seconds(),
                result.format
            );
            let _ = writeln!(
                out,
                "  Audio: {}{}",
                result.audio_path.display(),
                size_suffix(&result.audio_path)
            );
            if let Some(file_id) = job.file_id() {
                let _ = writeln!(out, "  File ID: {}", file_id);
            }
            if let Some(path) = &result.screenshot_path {
                let _ = writeln!(out, "  Screenshot: {}", path.display());
            }
            if let Some(path) = &result.thumbnail_path {
                let _ = writeln!(out, "  Thumbnail: {}", path.display());
            }
        }
        (JobStatus::Error, _, Some(error)) => {
            let _ = writeln!(out, "Job {} failed", job.id());
            let _ = writeln!(out, "  Error: {}", error.message);
        }
        (status, _, _) => {
            let _ = writeln!(out, "Job {} {} ({}%)", job.id(), status, job.progress());
        }
    }

    out.trim_end().to_string()
}

fn size_suffix(path: &Path) -> String {
    fs_err::metadata(path)
        .map(|m| format!(" ({})", format_file_size(m.len())))
        .unwrap_or_default()
}
