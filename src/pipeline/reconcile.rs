// src/pipeline/reconcile.rs

//! Record reconciliation.
//!
//! Matches primary records to secondary (event detail) records, copies
//! descriptive fields the primary lacks, and removes duplicates.

use std::collections::{BTreeSet, HashMap, HashSet};

use sha2::{Digest, Sha256};

use crate::models::{ReconcileConfig, Record};
use crate::utils::url::normalize_event_url;

/// True for empty values and configured "unknown" placeholders.
pub fn is_blank(value: &str, sentinels: &[String]) -> bool {
    let value = value.trim();
    value.is_empty() || sentinels.iter().any(|s| s.eq_ignore_ascii_case(value))
}

/// First non-blank value among `keys`.
fn first_value<'a>(record: &'a Record, keys: &[String], sentinels: &[String]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| record.get(k))
        .map(|v| v.trim())
        .find(|v| !is_blank(v, sentinels))
}

/// Which key of the cascade matched a primary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    ExactUrl,
    NormalizedUrl,
    Id,
}

/// Result of reconciling one primary record set.
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    /// Enriched, deduplicated records with a uniform column set
    pub records: Vec<Record>,
    pub matched_exact: usize,
    pub matched_normalized: usize,
    pub matched_id: usize,
    pub fields_enriched: usize,
    pub duplicates_removed: usize,
    pub columns: usize,
}

impl Reconciled {
    pub fn matched(&self) -> usize {
        self.matched_exact + self.matched_normalized + self.matched_id
    }
}

/// Enrich `primary` from `secondary`, then deduplicate.
///
/// Unmatched primary records pass through unchanged; input order is kept.
pub fn reconcile(
    primary: Vec<Record>,
    secondary: Vec<Record>,
    config: &ReconcileConfig,
) -> Reconciled {
    let mut out = Reconciled::default();
    let mut records = primary;

    let index = SecondaryIndex::build(secondary, config);
    if !index.is_empty() {
        for record in records.iter_mut() {
            let Some((tier, found)) = index.find_tier(record, config) else {
                continue;
            };
            match tier {
                MatchTier::ExactUrl => out.matched_exact += 1,
                MatchTier::NormalizedUrl => out.matched_normalized += 1,
                MatchTier::Id => out.matched_id += 1,
            }
            out.fields_enriched += enrich(record, found, config);
        }
    }

    let (mut records, removed) = dedup(records, config);
    out.duplicates_removed = removed;
    out.columns = unify_columns(&mut records);
    out.records = records;
    out
}

/// Lookup of secondary records by exact URL, normalized URL and id.
///
/// When several secondary records share a key, the first one wins.
#[derive(Debug)]
pub struct SecondaryIndex {
    records: Vec<Record>,
    exact: HashMap<String, usize>,
    normalized: HashMap<String, usize>,
    ids: HashMap<String, usize>,
}

impl SecondaryIndex {
    pub fn build(records: Vec<Record>, config: &ReconcileConfig) -> Self {
        let mut exact = HashMap::new();
        let mut normalized = HashMap::new();
        let mut ids = HashMap::new();

        for (i, record) in records.iter().enumerate() {
            for key in &config.secondary_url_keys {
                let Some(url) = record.get(key).map(|v| v.trim()) else {
                    continue;
                };
                if is_blank(url, &config.sentinels) {
                    continue;
                }
                exact.entry(url.to_string()).or_insert(i);
                if let Some(norm) = normalize_event_url(url, &config.trailing_segments) {
                    normalized.entry(norm).or_insert(i);
                }
            }
            for key in &config.secondary_id_keys {
                if let Some(id) = record.get(key).map(|v| v.trim()) {
                    if !is_blank(id, &config.sentinels) {
                        ids.entry(id.to_lowercase()).or_insert(i);
                    }
                }
            }
        }

        Self {
            records,
            exact,
            normalized,
            ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Find the secondary record for `primary`: exact URL, then normalized
    /// URL, then identifier.
    pub fn find(&self, primary: &Record, config: &ReconcileConfig) -> Option<&Record> {
        self.find_tier(primary, config).map(|(_, record)| record)
    }

    /// Like [`find`](Self::find), also reporting which key matched.
    pub fn find_tier(
        &self,
        primary: &Record,
        config: &ReconcileConfig,
    ) -> Option<(MatchTier, &Record)> {
        let urls: Vec<&str> = config
            .primary_url_keys
            .iter()
            .filter_map(|k| primary.get(k))
            .map(|v| v.trim())
            .filter(|v| !is_blank(v, &config.sentinels))
            .collect();

        let hit = urls
            .iter()
            .find_map(|u| self.exact.get(*u))
            .map(|i| (MatchTier::ExactUrl, *i))
            .or_else(|| {
                urls.iter()
                    .find_map(|u| {
                        normalize_event_url(u, &config.trailing_segments)
                            .and_then(|n| self.normalized.get(&n))
                    })
                    .map(|i| (MatchTier::NormalizedUrl, *i))
            })
            .or_else(|| {
                config
                    .primary_id_keys
                    .iter()
                    .filter_map(|k| primary.get(k))
                    .map(|v| v.trim())
                    .filter(|v| !is_blank(v, &config.sentinels))
                    .find_map(|id| self.ids.get(&id.to_lowercase()))
                    .map(|i| (MatchTier::Id, *i))
            });

        hit.map(|(tier, i)| (tier, &self.records[i]))
    }
}

/// Copy descriptive fields from `secondary` into blank fields of `primary`.
///
/// Non-blank primary values are never overwritten. Returns the number of
/// fields filled.
pub fn enrich(primary: &mut Record, secondary: &Record, config: &ReconcileConfig) -> usize {
    let mut filled = 0;
    for rule in &config.enrich {
        let current = primary.get(&rule.target).map(String::as_str).unwrap_or("");
        if !is_blank(current, &config.sentinels) {
            continue;
        }
        if let Some(value) = first_value(secondary, &rule.sources, &config.sentinels) {
            primary.insert(rule.target.clone(), value.to_string());
            filled += 1;
        }
    }
    filled
}

/// Deduplication key of a record.
///
/// The first configured key set whose columns are all non-blank is used;
/// URL columns compare in normalized form. Records with no usable key set
/// fall back to a hash of their full content.
pub fn dedup_key(record: &Record, config: &ReconcileConfig) -> String {
    for (set_index, columns) in config.dedup_keys.iter().enumerate() {
        let values: Option<Vec<String>> = columns
            .iter()
            .map(|column| {
                let value = record.get(column).map(|v| v.trim())?;
                if is_blank(value, &config.sentinels) {
                    return None;
                }
                if config.primary_url_keys.contains(column) {
                    normalize_event_url(value, &config.trailing_segments)
                } else {
                    Some(value.to_lowercase())
                }
            })
            .collect();
        if let Some(values) = values {
            return format!("{}|{}", set_index, values.join("\u{1f}"));
        }
    }

    let canonical = serde_json::to_string(record).unwrap_or_default();
    format!("raw|{}", hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// Keep the first record for each dedup key. Returns (kept, removed).
pub fn dedup(records: Vec<Record>, config: &ReconcileConfig) -> (Vec<Record>, usize) {
    let mut seen = HashSet::new();
    let total = records.len();
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|r| seen.insert(dedup_key(r, config)))
        .collect();
    let removed = total - kept.len();
    (kept, removed)
}

/// Give every record the same columns, filling gaps with empty strings.
pub fn unify_columns(records: &mut [Record]) -> usize {
    let columns: BTreeSet<String> = records.iter().flat_map(|r| r.keys().cloned()).collect();
    for record in records.iter_mut() {
        for column in &columns {
            record.entry(column.clone()).or_default();
        }
    }
    columns.len()
}
