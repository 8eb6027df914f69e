//! Checkpoint store.
//!
//! Tracks which events are fully processed and, for events still in
//! progress, the index of the next participant to process. Every update is
//! persisted with an atomic replace, so a crash at any point leaves either
//! the previous or the new state on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::fs::{load_json, save_json};

/// A per-event or per-participant failure kept for later inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub event_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,

    pub message: String,

    pub at: DateTime<Utc>,
}

/// Persisted checkpoint document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Events whose participants have all been processed
    #[serde(default)]
    pub completed: BTreeSet<String>,

    /// Event id to index of the next participant to process
    #[serde(default)]
    pub in_progress: BTreeMap<String, usize>,

    #[serde(default)]
    pub failures: Vec<FailureRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Counts for `checkpoint show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointSummary {
    pub completed: usize,
    pub in_progress: usize,
    pub failures: usize,
}

/// File-backed checkpoint store.
#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    state: CheckpointState,
}

impl Checkpoint {
    /// Open the checkpoint at `path`.
    ///
    /// With `resume` the stored state is loaded; a missing or unreadable
    /// file yields an empty state. Without `resume` the run starts fresh and
    /// the stored state is replaced on the first update.
    pub fn open(path: impl Into<PathBuf>, resume: bool) -> Self {
        let path = path.into();
        let state = if resume {
            Self::load_state(&path)
        } else {
            log::info!("Starting fresh; ignoring checkpoint at {}", path.display());
            CheckpointState::default()
        };
        Self { path, state }
    }

    fn load_state(path: &Path) -> CheckpointState {
        if !path.exists() {
            log::info!("No checkpoint at {}; starting empty", path.display());
            return CheckpointState::default();
        }
        match load_json::<CheckpointState>(path) {
            Ok(state) => {
                log::info!(
                    "Resuming from checkpoint: {} completed, {} in progress",
                    state.completed.len(),
                    state.in_progress.len()
                );
                state
            }
            Err(e) => {
                log::warn!(
                    "Checkpoint {} unreadable ({}); starting empty",
                    path.display(),
                    e
                );
                CheckpointState::default()
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    pub fn is_entity_done(&self, event_id: &str) -> bool {
        self.state.completed.contains(event_id)
    }

    /// True once the event's own row has been written.
    pub fn is_entity_started(&self, event_id: &str) -> bool {
        self.is_entity_done(event_id) || self.state.in_progress.contains_key(event_id)
    }

    /// Number of participants already processed, i.e. the 1-based index of
    /// the last completed one (0 when none). Also the next 0-based index.
    pub fn last_sub_index(&self, event_id: &str) -> usize {
        self.state.in_progress.get(event_id).copied().unwrap_or(0)
    }

    /// Record that participants before `next_index` are processed.
    ///
    /// The stored index never moves backwards and completed events are left
    /// untouched.
    pub fn advance(&mut self, event_id: &str, next_index: usize) -> Result<()> {
        if self.is_entity_done(event_id) {
            return Ok(());
        }
        let entry = self
            .state
            .in_progress
            .entry(event_id.to_string())
            .or_insert(next_index);
        *entry = (*entry).max(next_index);
        self.save()
    }

    /// Move the event from in-progress to completed.
    pub fn mark_entity_done(&mut self, event_id: &str) -> Result<()> {
        self.state.in_progress.remove(event_id);
        self.state.completed.insert(event_id.to_string());
        self.save()
    }

    /// Append a failure; it is persisted with the next progress update.
    pub fn record_failure(
        &mut self,
        event_id: &str,
        participant_id: Option<&str>,
        message: impl Into<String>,
    ) {
        self.state.failures.push(FailureRecord {
            event_id: event_id.to_string(),
            participant_id: participant_id.map(str::to_string),
            message: message.into(),
            at: Utc::now(),
        });
    }

    /// Forget all progress and delete the file.
    pub fn clear(&mut self) -> Result<()> {
        self.state = CheckpointState::default();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            completed: self.state.completed.len(),
            in_progress: self.state.in_progress.len(),
            failures: self.state.failures.len(),
        }
    }

    fn save(&mut self) -> Result<()> {
        self.state.updated_at = Some(Utc::now());
        save_json(&self.path, &self.state)
    }
}
