//! Flat output records and their column layout.

use std::collections::BTreeMap;

use crate::models::{Classification, Event, Field, Participant};

/// A loaded or reconciled record: column name to value.
pub type Record = BTreeMap<String, String>;

/// Column names shared by the sinks, the loader and the merge engine.
pub mod columns {
    pub const EVENT_ID: &str = "event_id";
    pub const EVENT_URL: &str = "event_url";
    pub const EVENT_TITLE: &str = "event_title";
    pub const EVENT_ORGANIZER: &str = "event_organizer";
    pub const EVENT_CLUB: &str = "event_club";
    pub const EVENT_LOCATION: &str = "event_location";
    pub const EVENT_DATES: &str = "event_dates";
    pub const EVENT_STATUS: &str = "event_status";
    pub const PARTICIPANTS_URL: &str = "participants_url";
    pub const PARTICIPANT_ID: &str = "participant_id";

    /// Per-slot column stems, suffixed with `_<n>` (1-based).
    pub const SLOT_STEMS: [&str; 6] = ["day", "date", "rounds", "grade", "category", "extra_category"];
}

/// Column layout of the entity-level and participant-level sinks.
#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    max_slots: usize,
}

impl RecordLayout {
    pub fn new(max_slots: usize) -> Self {
        Self { max_slots }
    }

    /// Header of the entity-level sink.
    pub fn event_header(&self) -> Vec<String> {
        [
            columns::EVENT_ID,
            columns::EVENT_URL,
            columns::EVENT_TITLE,
            columns::EVENT_ORGANIZER,
            columns::EVENT_CLUB,
            columns::EVENT_LOCATION,
            columns::EVENT_DATES,
            columns::EVENT_STATUS,
            columns::PARTICIPANTS_URL,
        ]
        .iter()
        .map(|c| c.to_string())
        .collect()
    }

    /// One entity-level row.
    pub fn event_row(&self, event: &Event) -> Vec<String> {
        let mut row = self.event_descriptive(event);
        row.push(Event::or_unknown(&event.status).to_string());
        row.push(event.participants_url.clone().unwrap_or_default());
        row
    }

    /// Header of the participant-level sink.
    pub fn participant_header(&self) -> Vec<String> {
        let mut header: Vec<String> = [
            columns::EVENT_ID,
            columns::EVENT_URL,
            columns::EVENT_TITLE,
            columns::EVENT_ORGANIZER,
            columns::EVENT_CLUB,
            columns::EVENT_LOCATION,
            columns::EVENT_DATES,
            columns::PARTICIPANT_ID,
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();

        header.extend(Field::ALL.iter().map(|f| f.as_str().to_string()));

        for n in 1..=self.max_slots {
            header.extend(columns::SLOT_STEMS.iter().map(|stem| format!("{stem}_{n}")));
        }
        header
    }

    /// One participant-level row: event fields, canonical fields, then slots.
    ///
    /// `classifications[i]` belongs to `participant.schedule[i]`; slots past
    /// `max_slots` are dropped and missing ones are left empty.
    pub fn participant_row(
        &self,
        event: &Event,
        participant: &Participant,
        classifications: &[Classification],
    ) -> Vec<String> {
        let mut row = self.event_descriptive(event);
        row.push(participant.id.clone());
        row.extend(Field::ALL.iter().map(|f| participant.get(*f).to_string()));

        for n in 0..self.max_slots {
            match participant.schedule.get(n) {
                Some(slot) => {
                    row.push(slot.day.clone());
                    row.push(slot.date.clone());
                    row.push(slot.rounds.clone());
                    let axes = classifications
                        .get(n)
                        .map(Classification::as_strings)
                        .unwrap_or_default();
                    row.extend(axes);
                }
                None => row.extend(std::iter::repeat_n(String::new(), columns::SLOT_STEMS.len())),
            }
        }
        row
    }

    fn event_descriptive(&self, event: &Event) -> Vec<String> {
        vec![
            event.id.clone(),
            event.url.clone(),
            Event::or_unknown(&event.title).to_string(),
            Event::or_unknown(&event.organizer).to_string(),
            Event::or_unknown(&event.club).to_string(),
            Event::or_unknown(&event.location).to_string(),
            Event::or_unknown(&event.dates).to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Grade, ScheduleSlot, SizeCategory, UNKNOWN};

    fn sample_event() -> Event {
        Event {
            id: "evt-1".to_string(),
            url: "https://example.com/zone/events/evt-1".to_string(),
            title: "Open de Primavera".to_string(),
            ..Event::default()
        }
    }

    #[test]
    fn participant_row_matches_header_width() {
        let layout = RecordLayout::new(3);
        let mut participant = Participant {
            id: "p1".to_string(),
            ..Participant::default()
        };
        participant.fields.insert(Field::Dog, "Luna".to_string());
        participant.schedule.push(ScheduleSlot {
            day: "Sábado".to_string(),
            date: "12/04/2025".to_string(),
            rounds: "G2/M".to_string(),
        });
        let classification = Classification {
            grade: Some(Grade::G2),
            category: Some(SizeCategory::Medium),
            extra_category: None,
        };

        let header = layout.participant_header();
        let row = layout.participant_row(&sample_event(), &participant, &[classification]);
        assert_eq!(header.len(), row.len());

        let record: Record = header.into_iter().zip(row).collect();
        assert_eq!(record["dog"], "Luna");
        assert_eq!(record["event_organizer"], UNKNOWN);
        assert_eq!(record["grade_1"], "G2");
        assert_eq!(record["category_1"], "M");
        assert_eq!(record["extra_category_1"], "");
        assert_eq!(record["rounds_2"], "");
    }

    #[test]
    fn event_row_matches_header_width() {
        let layout = RecordLayout::new(10);
        assert_eq!(layout.event_header().len(), layout.event_row(&sample_event()).len());
    }
}
