// src/pipeline/merge.rs

//! Merge step: discover inputs, reconcile, write the final document.

use std::path::PathBuf;

use crate::error::Result;
use crate::models::{Config, Record};
use crate::utils::fs::save_json;
use crate::utils::report;

use super::discover::discover;
use super::reconcile::reconcile;

/// Inputs and output of one merge run.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// File or directory holding participant records
    pub primary: PathBuf,

    /// File or directory holding event detail records
    pub secondary: Option<PathBuf>,

    /// Final JSON document
    pub output: PathBuf,
}

impl MergeOptions {
    /// Primary from the output directory, no secondary, configured output.
    pub fn from_config(config: &Config) -> Self {
        Self {
            primary: config.paths.output_dir(),
            secondary: None,
            output: config.paths.final_output_path(),
        }
    }
}

/// What a merge run did.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub primary_files: Vec<PathBuf>,
    pub secondary_files: Vec<PathBuf>,
    pub primary_records: usize,
    pub secondary_records: usize,
    pub matched: usize,
    pub matched_exact: usize,
    pub matched_normalized: usize,
    pub matched_id: usize,
    pub fields_enriched: usize,
    pub duplicates_removed: usize,
    pub columns: usize,
    pub output_records: usize,
    pub output: PathBuf,
}

/// Run the merge step.
///
/// The output document is always written: when the primary input cannot
/// be resolved an empty array is written before the error is returned. A
/// secondary input that cannot be resolved only disables enrichment.
pub fn run_merge(config: &Config, options: &MergeOptions) -> Result<MergeReport> {
    report::header("Merge - Reconciling participant records");
    let mut merge_report = MergeReport {
        output: options.output.clone(),
        ..MergeReport::default()
    };

    report::step(1, 3, "Discovering inputs");
    let primary = match discover(&options.primary, &config.discovery.participants) {
        Ok(primary) => primary,
        Err(e) => {
            log::error!("No primary input at {}: {}", options.primary.display(), e);
            save_json(&options.output, &Vec::<Record>::new())?;
            log::warn!("Wrote empty document to {}", options.output.display());
            return Err(e);
        }
    };
    merge_report.primary_files = primary.files;
    merge_report.primary_records = primary.records.len();
    let records = primary.records;

    let secondary = match &options.secondary {
        Some(path) => match discover(path, &config.discovery.event_details) {
            Ok(secondary) => {
                merge_report.secondary_files = secondary.files;
                merge_report.secondary_records = secondary.records.len();
                secondary.records
            }
            Err(e) => {
                log::warn!(
                    "Event details unavailable at {} ({}); continuing without enrichment",
                    path.display(),
                    e
                );
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    report::step(2, 3, "Matching, enriching and deduplicating");
    let reconciled = reconcile(records, secondary, &config.reconcile);
    log::debug!(
        "Matched {} by URL, {} by normalized URL, {} by id",
        reconciled.matched_exact,
        reconciled.matched_normalized,
        reconciled.matched_id
    );
    merge_report.matched = reconciled.matched();
    merge_report.matched_exact = reconciled.matched_exact;
    merge_report.matched_normalized = reconciled.matched_normalized;
    merge_report.matched_id = reconciled.matched_id;
    merge_report.fields_enriched = reconciled.fields_enriched;
    merge_report.duplicates_removed = reconciled.duplicates_removed;
    merge_report.columns = reconciled.columns;
    merge_report.output_records = reconciled.records.len();
    let records = reconciled.records;

    report::step(3, 3, "Writing final document");
    save_json(&options.output, &records)?;

    report::summary(
        "Merge",
        &[
            ("Primary files", merge_report.primary_files.len().to_string()),
            ("Primary records", merge_report.primary_records.to_string()),
            ("Secondary records", merge_report.secondary_records.to_string()),
            ("Matched", merge_report.matched.to_string()),
            ("Fields enriched", merge_report.fields_enriched.to_string()),
            ("Duplicates removed", merge_report.duplicates_removed.to_string()),
            ("Output records", merge_report.output_records.to_string()),
            ("Output", options.output.display().to_string()),
        ],
    );

    Ok(merge_report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::fs::load_json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_primary_writes_empty_document_and_fails() {
        let tmp = TempDir::new().unwrap();
        let options = MergeOptions {
            primary: tmp.path().join("nothing-here"),
            secondary: None,
            output: tmp.path().join("final.json"),
        };

        assert!(run_merge(&Config::default(), &options).is_err());
        let written: Vec<Record> = load_json(&options.output).unwrap();
        assert!(written.is_empty());
    }

    #[test]
    fn missing_secondary_only_skips_enrichment() {
        let tmp = TempDir::new().unwrap();
        let primary = tmp.path().join("participants_2025-04-12.csv");
        fs::write(
            &primary,
            "event_id,event_url,event_title,participant_id,dog\n\
             e1,https://x.com/zone/events/e1,unknown,p1,Luna\n\
             e1,https://x.com/zone/events/e1,unknown,p1,Luna\n",
        )
        .unwrap();
        let options = MergeOptions {
            primary,
            secondary: Some(tmp.path().join("no-details")),
            output: tmp.path().join("final.json"),
        };

        let report = run_merge(&Config::default(), &options).unwrap();
        assert_eq!(report.primary_records, 2);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.matched, 0);

        let written: Vec<Record> = load_json(&options.output).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["event_title"], "unknown");
    }

    #[test]
    fn secondary_enriches_unknown_fields() {
        let tmp = TempDir::new().unwrap();
        let primary = tmp.path().join("participants.csv");
        fs::write(
            &primary,
            "event_id,event_url,event_title,event_location,participant_id\n\
             e1,https://x.com/zone/events/e1/participants_list,unknown,Gijón,p1\n",
        )
        .unwrap();
        let secondary = tmp.path().join("details.json");
        fs::write(
            &secondary,
            r#"[{"enlaces": {"info": "https://x.com/zone/events/e1/info"},
                 "nombre": "Trofeo Norte", "lugar": "Oviedo"}]"#,
        )
        .unwrap();
        let options = MergeOptions {
            primary,
            secondary: Some(secondary),
            output: tmp.path().join("final.json"),
        };

        let report = run_merge(&Config::default(), &options).unwrap();
        assert_eq!(report.matched, 1);

        let written: Vec<Record> = load_json(&options.output).unwrap();
        assert_eq!(written[0]["event_title"], "Trofeo Norte");
        assert_eq!(written[0]["event_location"], "Gijón");
    }
}
