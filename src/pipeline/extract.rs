// src/pipeline/extract.rs

//! Resumable extraction run.
//!
//! Walks the event listing, writes one entity-level row per event and one
//! participant-level row per successfully fetched participant, and
//! advances the checkpoint only after the corresponding row is on disk.
//! Completed events are never fetched again; events left in progress
//! resume at the first unprocessed participant.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Local;
use tokio::time::Instant;

use crate::error::Result;
use crate::models::{Classification, Config, Event, Field, RecordLayout};
use crate::services::{Classifier, Normalizer, PageSource, RetryPolicy, RetryingSource};
use crate::storage::{Checkpoint, TabularSink};
use crate::utils::fs::ensure_dir;
use crate::utils::report;

/// Counters and state of one extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractOutcome {
    pub events_listed: usize,
    pub events_completed: usize,
    /// Events already completed by an earlier run
    pub events_skipped: usize,
    /// Events left in progress (limit, budget or stop)
    pub events_paused: usize,
    pub events_failed: usize,
    pub participants_written: usize,
    pub participants_failed: usize,
    /// Stopped early by the stop flag
    pub stopped: bool,
    pub events_sink: PathBuf,
    pub participants_sink: PathBuf,
}

/// How processing of one event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventProgress {
    Completed,
    /// Left in progress; the run continues with the next event
    Paused,
    /// Left in progress; the run ends
    Stopped,
    Failed,
}

/// Enforces a minimum delay between page-source calls.
struct Pacer {
    delay: Duration,
    last: Option<Instant>,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self { delay, last: None }
    }

    async fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

struct ExtractRun<'a, S: PageSource> {
    config: &'a Config,
    layout: RecordLayout,
    source: RetryingSource<S>,
    normalizer: Normalizer,
    classifier: Classifier,
    checkpoint: Checkpoint,
    events_sink: TabularSink,
    participants_sink: TabularSink,
    pacer: Pacer,
    stop: Arc<AtomicBool>,
    outcome: ExtractOutcome,
}

/// Run the extraction against `source` until done, limited or stopped.
///
/// Failing to list events is fatal. A failure for one event or one
/// participant is logged, recorded in the checkpoint and skipped. Setting
/// `stop` ends the run at the next participant boundary.
pub async fn run_extract<S: PageSource>(
    config: &Config,
    source: S,
    stop: Arc<AtomicBool>,
) -> Result<ExtractOutcome> {
    report::header("Extract - Harvesting events and participants");

    let paths = &config.paths;
    ensure_dir(&paths.output_dir())?;
    let run_date = Local::now().date_naive();
    let layout = RecordLayout::new(config.extract.max_slots);

    let events_sink = TabularSink::open(paths.events_sink_path(run_date), layout.event_header())?;
    let participants_sink = TabularSink::open(
        paths.participants_sink_path(run_date),
        layout.participant_header(),
    )?;

    let run = ExtractRun {
        config,
        layout,
        source: RetryingSource::new(source, RetryPolicy::from_config(&config.extract)),
        normalizer: Normalizer::new(&config.normalizer, config.extract.max_slots)?,
        classifier: Classifier::new(&config.classifier)?,
        checkpoint: Checkpoint::open(paths.checkpoint_path(), config.extract.resume),
        outcome: ExtractOutcome {
            events_sink: events_sink.path().to_path_buf(),
            participants_sink: participants_sink.path().to_path_buf(),
            ..ExtractOutcome::default()
        },
        events_sink,
        participants_sink,
        pacer: Pacer::new(Duration::from_millis(config.extract.request_delay_ms)),
        stop,
    };
    run.execute().await
}

impl<S: PageSource> ExtractRun<'_, S> {
    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    async fn execute(mut self) -> Result<ExtractOutcome> {
        report::step(1, 2, "Listing events");
        self.pacer.wait().await;
        let events = self.source.list_events().await?;
        self.outcome.events_listed = events.len();
        log::info!("{} events listed", events.len());

        report::step(2, 2, "Processing events");
        let max_events = self.config.extract.max_events;
        let mut processed = 0usize;

        for mut event in events {
            if self.stop_requested() {
                self.outcome.stopped = true;
                break;
            }
            if !event.ensure_id() {
                log::warn!("Skipping event without identifier: '{}'", event.title);
                self.outcome.events_failed += 1;
                continue;
            }
            if self.checkpoint.is_entity_done(&event.id) {
                log::debug!("Event {} already completed", event.id);
                self.outcome.events_skipped += 1;
                continue;
            }
            if max_events > 0 && processed >= max_events {
                log::info!("Event limit ({}) reached", max_events);
                break;
            }
            processed += 1;

            match self.process_event(&event).await? {
                EventProgress::Completed => self.outcome.events_completed += 1,
                EventProgress::Paused => self.outcome.events_paused += 1,
                EventProgress::Failed => self.outcome.events_failed += 1,
                EventProgress::Stopped => {
                    self.outcome.events_paused += 1;
                    self.outcome.stopped = true;
                    break;
                }
            }
        }

        if self.outcome.stopped {
            log::warn!("Stop requested; progress saved to {}", self.checkpoint.path().display());
        }
        self.log_summary();
        Ok(self.outcome)
    }

    async fn process_event(&mut self, event: &Event) -> Result<EventProgress> {
        if !self.checkpoint.is_entity_started(&event.id) {
            self.events_sink.append(&self.layout.event_row(event))?;
            self.checkpoint.advance(&event.id, 0)?;
        }

        self.pacer.wait().await;
        let participants = match self.source.list_participants(event).await {
            Ok(participants) => participants,
            Err(e) => {
                log::error!("Participant list of {} failed: {}", event.id, e);
                self.checkpoint.record_failure(&event.id, None, e.to_string());
                self.checkpoint.mark_entity_done(&event.id)?;
                return Ok(EventProgress::Failed);
            }
        };

        let start = self.checkpoint.last_sub_index(&event.id);
        if start > 0 {
            log::info!(
                "Resuming event {} at participant {}/{}",
                event.id,
                start,
                participants.len()
            );
        }
        if start > participants.len() {
            log::warn!(
                "Event {} now lists {} participants, fewer than the checkpoint index {}",
                event.id,
                participants.len(),
                start
            );
        }

        let max_participants = self.config.extract.max_participants;
        let budget = Duration::from_secs(self.config.extract.event_budget_secs);
        let started_at = Instant::now();
        let mut handled = 0usize;

        for (index, participant_ref) in participants.iter().enumerate().skip(start) {
            if self.stop_requested() {
                return Ok(EventProgress::Stopped);
            }
            if max_participants > 0 && handled >= max_participants {
                log::info!(
                    "Participant limit ({}) reached for event {}; leaving it in progress",
                    max_participants,
                    event.id
                );
                return Ok(EventProgress::Paused);
            }
            if !budget.is_zero() && started_at.elapsed() >= budget {
                log::warn!(
                    "Time budget of {:?} exhausted for event {}; leaving it in progress",
                    budget,
                    event.id
                );
                return Ok(EventProgress::Paused);
            }

            self.pacer.wait().await;
            match self.source.fetch_participant(event, participant_ref).await {
                Ok(fragment) => {
                    let participant = self.normalizer.normalize(&participant_ref.id, &fragment);
                    let federation = participant.get(Field::Federation);
                    let classifications: Vec<Classification> = participant
                        .schedule
                        .iter()
                        .map(|slot| self.classifier.classify(&slot.rounds, federation))
                        .collect();
                    let row = self
                        .layout
                        .participant_row(event, &participant, &classifications);
                    self.participants_sink.append(&row)?;
                    self.outcome.participants_written += 1;
                }
                Err(e) => {
                    log::warn!(
                        "Participant {} of {} failed: {}",
                        participant_ref.id,
                        event.id,
                        e
                    );
                    self.checkpoint.record_failure(
                        &event.id,
                        Some(participant_ref.id.as_str()),
                        e.to_string(),
                    );
                    self.outcome.participants_failed += 1;
                }
            }
            handled += 1;
            self.checkpoint.advance(&event.id, index + 1)?;
        }

        self.checkpoint.mark_entity_done(&event.id)?;
        log::info!("Event {} completed ({} participants)", event.id, participants.len());
        Ok(EventProgress::Completed)
    }

    fn log_summary(&self) {
        let o = &self.outcome;
        report::summary(
            "Extract",
            &[
                ("Events listed", o.events_listed.to_string()),
                ("Events completed", o.events_completed.to_string()),
                ("Events skipped (already done)", o.events_skipped.to_string()),
                ("Events in progress", o.events_paused.to_string()),
                ("Events failed", o.events_failed.to_string()),
                ("Participants written", o.participants_written.to_string()),
                ("Participants failed", o.participants_failed.to_string()),
                ("Participants sink", o.participants_sink.display().to_string()),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{Capture, ReplaySource};
    use crate::services::source::{CapturedEvent, CapturedParticipant};
    use crate::models::{FragmentItem, ParticipantRef};
    use tempfile::TempDir;

    fn participant(id: &str, dog: &str) -> CapturedParticipant {
        CapturedParticipant {
            reference: ParticipantRef {
                id: id.to_string(),
                url: None,
            },
            fragment: vec![
                FragmentItem::pair("Perro", dog),
                FragmentItem::pair("Federación", "RSCE"),
                FragmentItem::day("Sábado"),
                FragmentItem::pair("Fecha", "12/04/2025"),
                FragmentItem::pair("Mangas", "G2/M(J12)"),
            ],
            error: None,
        }
    }

    fn capture(event_error: Option<&str>) -> Capture {
        Capture {
            events: vec![CapturedEvent {
                event: Event {
                    id: "e1".to_string(),
                    url: "https://x.com/zone/events/e1".to_string(),
                    title: "Trofeo".to_string(),
                    ..Event::default()
                },
                participants: vec![
                    participant("p1", "Luna"),
                    CapturedParticipant {
                        error: Some("detail did not render".to_string()),
                        ..participant("p2", "Rayo")
                    },
                    participant("p3", "Kira"),
                ],
                error: event_error.map(str::to_string),
            }],
        }
    }

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.paths.output_dir = dir.path().to_string_lossy().into_owned();
        config.extract.request_delay_ms = 0;
        config.extract.retry_backoff_ms = 0;
        config.extract.max_retries = 0;
        config
    }

    fn read_rows(path: &std::path::Path) -> Vec<csv::StringRecord> {
        csv::Reader::from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn failed_participant_is_skipped_and_recorded() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);

        let outcome = run_extract(
            &config,
            ReplaySource::new(capture(None)),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();

        assert_eq!(outcome.events_completed, 1);
        assert_eq!(outcome.participants_written, 2);
        assert_eq!(outcome.participants_failed, 1);

        let rows = read_rows(&outcome.participants_sink);
        assert_eq!(rows.len(), 2);

        let mut reader = csv::Reader::from_path(&outcome.participants_sink).unwrap();
        let header = reader.headers().unwrap().clone();
        let col = |name: &str| header.iter().position(|h| h == name).unwrap();
        assert_eq!(&rows[0][col("dog")], "Luna");
        assert_eq!(&rows[0][col("grade_1")], "G2");
        assert_eq!(&rows[0][col("category_1")], "M");
        assert_eq!(&rows[0][col("extra_category_1")], "J12");
        assert_eq!(&rows[0][col("event_organizer")], "unknown");

        let checkpoint = Checkpoint::open(config.paths.checkpoint_path(), true);
        assert!(checkpoint.is_entity_done("e1"));
        assert_eq!(checkpoint.state().failures.len(), 1);
    }

    #[tokio::test]
    async fn participant_limit_leaves_event_in_progress() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(&tmp);
        config.extract.max_participants = 1;

        let outcome = run_extract(
            &config,
            ReplaySource::new(capture(None)),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();
        assert_eq!(outcome.events_paused, 1);

        let checkpoint = Checkpoint::open(config.paths.checkpoint_path(), true);
        assert_eq!(checkpoint.last_sub_index("e1"), 1);
        assert_eq!(read_rows(&outcome.events_sink).len(), 1);

        // The second run does not rewrite the event row.
        config.extract.max_participants = 0;
        let outcome = run_extract(
            &config,
            ReplaySource::new(capture(None)),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();
        assert_eq!(outcome.events_completed, 1);
        assert_eq!(read_rows(&outcome.events_sink).len(), 1);
        assert_eq!(read_rows(&outcome.participants_sink).len(), 2);
    }

    #[tokio::test]
    async fn failed_participant_list_marks_event_done() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);

        let outcome = run_extract(
            &config,
            ReplaySource::new(capture(Some("listing crashed"))),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();
        assert_eq!(outcome.events_failed, 1);

        let checkpoint = Checkpoint::open(config.paths.checkpoint_path(), true);
        assert!(checkpoint.is_entity_done("e1"));
        assert_eq!(checkpoint.state().failures[0].participant_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_leaves_event_in_progress() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(&tmp);
        config.extract.request_delay_ms = 600;
        config.extract.event_budget_secs = 1;

        let outcome = run_extract(
            &config,
            ReplaySource::new(capture(None)),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();
        assert_eq!(outcome.events_paused, 1);
        assert_eq!(outcome.events_completed, 0);
        assert!(!outcome.stopped);

        let checkpoint = Checkpoint::open(config.paths.checkpoint_path(), true);
        assert!(!checkpoint.is_entity_done("e1"));
        assert_eq!(checkpoint.last_sub_index("e1"), 2);
        assert_eq!(read_rows(&outcome.participants_sink).len(), 1);

        config.extract.event_budget_secs = 0;
        let outcome = run_extract(
            &config,
            ReplaySource::new(capture(None)),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();
        assert_eq!(outcome.events_completed, 1);
        assert_eq!(outcome.participants_written, 1);
        assert_eq!(read_rows(&outcome.participants_sink).len(), 2);
        assert!(Checkpoint::open(config.paths.checkpoint_path(), true).is_entity_done("e1"));
    }

    #[tokio::test]
    async fn stop_flag_ends_run_before_first_event() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);

        let outcome = run_extract(
            &config,
            ReplaySource::new(capture(None)),
            Arc::new(AtomicBool::new(true)),
        )
        .await
        .unwrap();
        assert!(outcome.stopped);
        assert_eq!(outcome.participants_written, 0);
        assert!(!Checkpoint::open(config.paths.checkpoint_path(), true).is_entity_started("e1"));
    }
}
