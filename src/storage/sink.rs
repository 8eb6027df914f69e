//! Append-only CSV sinks.
//!
//! Each row is encoded in memory and written with a single append, so a
//! crash can at worst leave one torn trailing line. That line is cut off
//! the next time the sink is opened. Values are kept single-line, which
//! makes "one line = one row" hold for repair.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// A CSV file with a fixed header, written row by row.
#[derive(Debug)]
pub struct TabularSink {
    path: PathBuf,
    header: Vec<String>,
}

impl TabularSink {
    /// Open (or prepare to create) the sink at `path`.
    ///
    /// An existing file has a torn trailing line removed; its header must
    /// match `header`.
    pub fn open(path: impl Into<PathBuf>, header: Vec<String>) -> Result<Self> {
        let path = path.into();
        if header.is_empty() {
            return Err(AppError::validation("sink header is empty"));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        repair_tail(&path)?;
        if let Some(existing) = read_header(&path)? {
            if existing != header {
                return Err(AppError::validation(format!(
                    "{} has a different header ({} columns, expected {})",
                    path.display(),
                    existing.len(),
                    header.len()
                )));
            }
        }

        Ok(Self { path, header })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first when the file is new.
    pub fn append(&mut self, row: &[String]) -> Result<()> {
        append_row(&self.path, &self.header, row)
    }
}

/// Append one row to `path`, writing `header` first if the file is missing
/// or empty.
pub fn append_row(path: &Path, header: &[String], row: &[String]) -> Result<()> {
    if row.len() != header.len() {
        return Err(AppError::validation(format!(
            "row has {} values, header has {} columns",
            row.len(),
            header.len()
        )));
    }

    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if needs_header {
        writer.write_record(header)?;
    }
    writer.write_record(row.iter().map(|v| single_line(v)))?;
    let bytes = writer.into_inner().map_err(|e| AppError::Io(e.into_error()))?;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&bytes)?;
    file.flush()?;
    Ok(())
}

fn single_line(value: &str) -> String {
    if value.contains(['\n', '\r']) {
        value.replace(['\r', '\n'], " ")
    } else {
        value.to_string()
    }
}

/// Drop an incomplete trailing line left by an interrupted append.
fn repair_tail(path: &Path) -> Result<()> {
    let Ok(content) = fs::read(path) else {
        return Ok(());
    };
    if content.is_empty() || content.ends_with(b"\n") {
        return Ok(());
    }

    let keep = content
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    log::warn!(
        "Removing {} bytes of torn trailing row from {}",
        content.len() - keep,
        path.display()
    );
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(keep as u64)?;
    Ok(())
}

fn read_header(path: &Path) -> Result<Option<Vec<String>>> {
    if fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true) {
        return Ok(None);
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    match reader.records().next() {
        Some(record) => Ok(Some(record?.iter().map(str::to_string).collect())),
        None => Ok(None),
    }
}
