//! Report export and archiving.
//!
//! Reports are written as pretty-printed JSON named
//! `{project}_{YYYY_MM_DD}.json`. Files are published atomically: the
//! content goes to a temporary file in the target directory which is then
//! renamed, so an interrupted batch never leaves a truncated report.

use crate::models::ExportedProjectData;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const ARCHIVE_SUFFIX: &str = ".zip";

/// Strip path components and a trailing `.zip` (any case). Inner dots stay.
pub fn normalize_project_name(project_name: &str) -> String {
    let file_name = Path::new(project_name)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    if file_name.to_lowercase().ends_with(ARCHIVE_SUFFIX) {
        file_name[..file_name.len() - ARCHIVE_SUFFIX.len()].to_string()
    } else {
        file_name
    }
}

/// Serialize a report with four-space indentation.
pub fn report_to_json(report: &ExportedProjectData) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    report
        .serialize(&mut serializer)
        .context("Failed to serialize report")?;
    Ok(buffer)
}

/// File name of an exported report for the given export date.
pub fn export_file_name(project_name: &str, export_date: NaiveDate) -> String {
    format!(
        "{}_{}.json",
        normalize_project_name(project_name),
        export_date.format("%Y_%m_%d")
    )
}

/// Write `content` to `path` through a temporary file and a rename.
pub fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create directory {}", directory.display()))?;

    let mut temp = NamedTempFile::new_in(directory)
        .with_context(|| format!("Failed to create temporary file in {}", directory.display()))?;
    temp.write_all(content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to publish {}", path.display()))?;

    Ok(())
}

/// Export one report into `output_directory`, returning the written path.
pub fn export_project_data(
    report: &ExportedProjectData,
    output_directory: &Path,
    export_date: NaiveDate,
) -> Result<PathBuf> {
    let output_path = output_directory.join(export_file_name(&report.project_name, export_date));
    write_atomically(&output_path, &report_to_json(report)?)?;

    debug!("Exported {} to {}", report.project_name, output_path.display());
    Ok(output_path)
}

/// Bundle reports into an in-memory zip archive.
///
/// Entries are named after each report's own creation date, so historical
/// reports keep their names. Returns `None` for an empty list.
pub fn build_reports_archive(reports: &[ExportedProjectData]) -> Result<Option<Vec<u8>>> {
    if reports.is_empty() {
        return Ok(None);
    }

    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut seen = HashSet::new();

    for report in reports {
        let file_name = format!(
            "{}_{}.json",
            normalize_project_name(&report.project_name),
            report.created
        );
        if !seen.insert(file_name.clone()) {
            warn!("Skipping duplicate archive entry {}", file_name);
            continue;
        }

        archive
            .start_file(file_name.as_str(), options)
            .with_context(|| format!("Failed to add {} to archive", file_name))?;
        archive.write_all(&report_to_json(report)?)?;
    }

    let cursor = archive.finish().context("Failed to finalize archive")?;
    Ok(Some(cursor.into_inner()))
}
