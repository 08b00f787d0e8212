//! Artifact export: cached labels, predictions, scores and statistics.
//!
//! Every file is written to a temporary file in the target directory and
//! renamed into place with `tempfile::NamedTempFile::persist()`, so readers
//! never observe a partial artifact.

use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{AppError, Result};

/// Summary of a completed file write operation.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    /// Absolute path of the written file.
    pub path: PathBuf,
    /// Number of bytes written.
    pub bytes_written: usize,
}

/// Write `content` to `path` atomically, creating parent directories.
///
/// # Errors
///
/// Returns `AppError::Io` on directory creation, temp file write, or
/// rename failure.
pub fn write_atomic(path: &Path, content: &str) -> Result<WriteSummary> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Io(format!("{} has no parent directory", path.display())))?;

    std::fs::create_dir_all(parent).map_err(|err| {
        AppError::Io(format!(
            "failed to create parent directories for {}: {err}",
            path.display()
        ))
    })?;

    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;

    let bytes = content.as_bytes();
    tmp.write_all(bytes)
        .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;

    tmp.persist(path)
        .map_err(|err| AppError::Io(format!("failed to persist {}: {err}", path.display())))?;

    Ok(WriteSummary {
        path: path.to_path_buf(),
        bytes_written: bytes.len(),
    })
}

/// Serialize `value` as pretty JSON and write it atomically.
///
/// # Errors
///
/// Returns `AppError::Io` if serialization or the write fails.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<WriteSummary> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(format!("failed to encode {}: {err}", path.display())))?;
    write_atomic(path, &content)
}

/// Render score rows as whitespace-separated text, one row per line.
#[must_use]
pub fn format_rows(rows: &[Vec<f64>]) -> String {
    let mut out = String::new();
    for row in rows {
        let mut first = true;
        for value in row {
            if !first {
                out.push(' ');
            }
            first = false;
            let _ = write!(out, "{value}");
        }
        out.push('\n');
    }
    out
}

/// Render class indices, one per line.
#[must_use]
pub fn format_indices(indices: &[usize]) -> String {
    let mut out = String::new();
    for index in indices {
        let _ = writeln!(out, "{index}");
    }
    out
}

/// A cached label row: a bare class index or a one-hot / score vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LabelRow {
    /// Single value.
    Scalar(f64),
    /// Vector of values.
    Vector(Vec<f64>),
}

impl LabelRow {
    /// The row as a vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<f64> {
        match self {
            Self::Scalar(value) => vec![value],
            Self::Vector(values) => values,
        }
    }
}

/// Read cached label rows from a JSON array file.
///
/// # Errors
///
/// Returns `AppError::Io` if the file cannot be read, or
/// `AppError::InvalidInput` if it is not an array of label rows.
pub fn read_label_rows(path: &Path) -> Result<Vec<Vec<f64>>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| AppError::Io(format!("failed to read {}: {err}", path.display())))?;
    let rows: Vec<LabelRow> = serde_json::from_str(&raw).map_err(|err| {
        AppError::InvalidInput(format!("{} is not a label array: {err}", path.display()))
    })?;
    Ok(rows.into_iter().map(LabelRow::into_vec).collect())
}
