// src/pipeline/discover.rs

//! Input discovery and loading for the merge step.
//!
//! Given a file or a directory, finds the best available source for one
//! kind of input and loads it as flat [`Record`]s. Directories are searched
//! recursively, in priority order:
//!
//! 1. a consolidated file (e.g. `participants.json`)
//! 2. dated files (e.g. `participants_2025-04-12.csv`), newest first
//! 3. legacy tabular files matching glob patterns, newest first
//!
//! A file that cannot be parsed is logged and skipped.

use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::NaiveDate;
use glob::{MatchOptions, Pattern};
use regex::Regex;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{DiscoveryProfile, Record};

/// Keys under which a JSON object may hold its records.
const RECORD_KEYS: [&str; 4] = ["records", "participants", "events", "data"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Which discovery tier produced an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTier {
    /// The path given was a file
    Explicit,
    Consolidated,
    Dated,
    Legacy,
}

/// Records loaded for one input, with the files they came from.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub tier: SourceTier,
    pub files: Vec<PathBuf>,
    pub records: Vec<Record>,
}

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    name: String,
    modified: SystemTime,
}

/// Resolve `path` (file or directory) into records using `profile`.
pub fn discover(path: &Path, profile: &DiscoveryProfile) -> Result<ResolvedInput> {
    if path.is_file() {
        let records = load_records(path)?;
        return Ok(ResolvedInput {
            tier: SourceTier::Explicit,
            files: vec![path.to_path_buf()],
            records,
        });
    }
    if !path.is_dir() {
        return Err(AppError::discovery(format!(
            "{} does not exist",
            path.display()
        )));
    }

    let exclude = Regex::new(&profile.exclude)?;
    let dated = Regex::new(&profile.dated)?;
    let legacy = profile
        .legacy
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let candidates: Vec<Candidate> = list_files(path)?
        .into_iter()
        .filter(|c| !exclude.is_match(&c.name))
        .collect();
    log::debug!(
        "{} candidate files under {}",
        candidates.len(),
        path.display()
    );

    // Tier 1: consolidated
    let mut consolidated: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| {
            profile
                .consolidated
                .iter()
                .any(|n| n.eq_ignore_ascii_case(&c.name))
        })
        .collect();
    consolidated.sort_by_key(|c| Reverse(c.modified));
    for candidate in consolidated {
        match load_records(&candidate.path) {
            Ok(records) => {
                log::info!(
                    "Using consolidated input {} ({} records)",
                    candidate.path.display(),
                    records.len()
                );
                return Ok(ResolvedInput {
                    tier: SourceTier::Consolidated,
                    files: vec![candidate.path.clone()],
                    records,
                });
            }
            Err(e) => log::warn!("Skipping {}: {}", candidate.path.display(), e),
        }
    }

    // Tier 2: dated, newest date first, then newest modification
    let mut dated_files: Vec<(NaiveDate, &Candidate)> = candidates
        .iter()
        .filter_map(|c| {
            let caps = dated.captures(&c.name)?;
            let date = NaiveDate::parse_from_str(caps.name("date")?.as_str(), "%Y-%m-%d").ok()?;
            Some((date, c))
        })
        .collect();
    dated_files.sort_by_key(|(date, c)| Reverse((*date, c.modified)));
    let ordered: Vec<&Candidate> = dated_files.into_iter().map(|(_, c)| c).collect();
    if let Some(input) = load_all(&ordered, SourceTier::Dated) {
        return Ok(input);
    }

    // Tier 3: legacy
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    let mut legacy_files: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| legacy.iter().any(|p| p.matches_with(&c.name, options)))
        .collect();
    legacy_files.sort_by_key(|c| Reverse(c.modified));
    if let Some(input) = load_all(&legacy_files, SourceTier::Legacy) {
        return Ok(input);
    }

    Err(AppError::discovery(format!(
        "no usable input under {}",
        path.display()
    )))
}

/// Load every candidate, skipping malformed ones; `None` if none loaded.
fn load_all(candidates: &[&Candidate], tier: SourceTier) -> Option<ResolvedInput> {
    let mut input = ResolvedInput {
        tier,
        files: Vec::new(),
        records: Vec::new(),
    };
    for candidate in candidates {
        match load_records(&candidate.path) {
            Ok(records) => {
                log::info!(
                    "Using {:?} input {} ({} records)",
                    tier,
                    candidate.path.display(),
                    records.len()
                );
                input.files.push(candidate.path.clone());
                input.records.extend(records);
            }
            Err(e) => log::warn!("Skipping {}: {}", candidate.path.display(), e),
        }
    }
    if input.files.is_empty() { None } else { Some(input) }
}

fn list_files(dir: &Path) -> Result<Vec<Candidate>> {
    let pattern = format!("{}/**/*", Pattern::escape(&dir.to_string_lossy()));
    let mut files = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Unreadable path during discovery: {}", e);
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push(Candidate {
            path,
            name,
            modified,
        });
    }
    Ok(files)
}

/// Load one JSON or CSV file as flat records.
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let bytes = fs::read(path)?;
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

    match extension.as_str() {
        "json" => records_from_json(serde_json::from_slice(bytes)?),
        "csv" => records_from_csv(bytes),
        other => Err(AppError::discovery(format!(
            "unsupported input type '{}' for {}",
            other,
            path.display()
        ))),
    }
}

fn records_from_json(value: Value) -> Result<Vec<Record>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => RECORD_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| {
                AppError::discovery(format!(
                    "JSON object has none of the record keys {:?}",
                    RECORD_KEYS
                ))
            })?,
        _ => return Err(AppError::discovery("JSON input is not an array or object")),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(_) => {
                let mut record = Record::new();
                flatten_into(&mut record, "", &item);
                Some(record)
            }
            _ => None,
        })
        .collect())
}

/// Flatten nested objects into dotted keys; arrays of scalars are joined.
fn flatten_into(record: &mut Record, prefix: &str, value: &Value) {
    let key = |k: &str| {
        if prefix.is_empty() {
            k.trim().to_string()
        } else {
            format!("{}.{}", prefix, k.trim())
        }
    };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_into(record, &key(k), v);
            }
        }
        Value::Array(items) if items.iter().all(|v| !v.is_object() && !v.is_array()) => {
            let joined: Vec<String> = items.iter().map(scalar_to_string).collect();
            record.insert(prefix.to_string(), joined.join(", "));
        }
        Value::Array(_) => {
            record.insert(prefix.to_string(), value.to_string());
        }
        scalar => {
            record.insert(prefix.to_string(), scalar_to_string(scalar));
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn records_from_csv(bytes: &[u8]) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(|v| v.is_empty()) {
            continue;
        }
        let record: Record = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty())
            .map(|(i, h)| (h.to_string(), row.get(i).unwrap_or_default().to_string()))
            .collect();
        records.push(record);
    }
    Ok(records)
}
