// src/services/normalizer.rs

//! Participant normalizer.
//!
//! Turns a raw detail fragment (label/value pairs and day headers, in
//! document order) into a [`Participant`] keyed by canonical fields, plus
//! its ordered schedule slots.

use std::collections::{HashMap, HashSet};

use regex::{Regex, RegexBuilder};

use crate::error::Result;
use crate::models::{Field, FragmentItem, NormalizerConfig, Participant, ScheduleSlot};
use crate::utils::text::{collapse_whitespace, fold, fold_label};

/// What a rendered label stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelTarget {
    Field(Field),
    /// Date of a schedule slot
    Date,
    /// Rounds-string of a schedule slot
    Rounds,
}

/// Maps source labels to canonical fields and assembles schedule slots.
#[derive(Debug)]
pub struct Normalizer {
    exact: HashMap<String, LabelTarget>,
    ignored: HashSet<String>,
    spellings: Vec<(String, LabelTarget)>,
    day_headers: Vec<Regex>,
    min_containment_len: usize,
    max_slots: usize,
    height_digits: Regex,
    dog_prefix: Regex,
}

impl Normalizer {
    /// Build the lookup tables from configuration.
    pub fn new(config: &NormalizerConfig, max_slots: usize) -> Result<Self> {
        let mut entries: Vec<(String, LabelTarget)> = Vec::new();
        for synonyms in &config.fields {
            let target = LabelTarget::Field(synonyms.field);
            entries.push((fold_label(synonyms.field.as_str()), target));
            entries.extend(synonyms.spellings.iter().map(|s| (fold_label(s), target)));
        }
        entries.extend(config.date_labels.iter().map(|s| (fold_label(s), LabelTarget::Date)));
        entries.extend(
            config
                .rounds_labels
                .iter()
                .map(|s| (fold_label(s), LabelTarget::Rounds)),
        );
        entries.retain(|(spelling, _)| !spelling.is_empty());

        let mut exact = HashMap::new();
        for (spelling, target) in &entries {
            exact.entry(spelling.clone()).or_insert(*target);
        }

        let ignored = config
            .ignored_labels
            .iter()
            .map(|s| fold_label(s))
            .filter(|s| !s.is_empty())
            .collect();

        let day_headers = config
            .day_header_patterns
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            exact,
            ignored,
            spellings: entries,
            day_headers,
            min_containment_len: config.min_containment_len.max(1),
            max_slots,
            height_digits: Regex::new(r"(\d{2,3})")?,
            dog_prefix: Regex::new(r"(?i)^\s*mi\s+perro\b\s*[:\-]?\s*")?,
        })
    }

    /// Resolve a rendered label.
    ///
    /// Ignored labels never resolve. Exact synonym matches win; otherwise
    /// the longest spelling found inside the label is used. A single-word
    /// spelling may also contain the label ("fede" matches "federacion"),
    /// a multi-word one may not. Very short labels and spellings never take
    /// part in containment.
    pub fn resolve_label(&self, label: &str) -> Option<LabelTarget> {
        let folded = fold_label(label);
        if folded.is_empty() || self.ignored.contains(&folded) {
            return None;
        }
        if let Some(target) = self.exact.get(&folded) {
            return Some(*target);
        }

        let label_len = folded.chars().count();
        if label_len < self.min_containment_len {
            return None;
        }

        let mut best: Option<(usize, LabelTarget)> = None;
        for (spelling, target) in &self.spellings {
            let len = spelling.chars().count();
            if len < self.min_containment_len {
                continue;
            }
            let single_word = !spelling.contains(' ');
            let matches = folded.contains(spelling.as_str())
                || (single_word && spelling.contains(folded.as_str()));
            if matches
                && best.is_none_or(|(best_len, _)| len > best_len)
            {
                best = Some((len, *target));
            }
        }
        best.map(|(_, target)| target)
    }

    /// True when `text` reads as a day heading ("Sábado", "Día 2", ...).
    pub fn is_day_header(&self, text: &str) -> bool {
        let folded = fold(text);
        !folded.is_empty() && self.day_headers.iter().any(|re| re.is_match(&folded))
    }

    /// Normalize one participant's fragment.
    pub fn normalize(&self, id: &str, fragment: &[FragmentItem]) -> Participant {
        let mut participant = Participant {
            id: id.to_string(),
            ..Participant::default()
        };
        let mut day = String::new();
        let mut pending_date: Option<String> = None;

        for item in fragment {
            match item {
                FragmentItem::DayHeader { text } => {
                    if self.is_day_header(text) {
                        day = collapse_whitespace(text);
                        pending_date = None;
                    } else {
                        log::trace!("Ignoring heading '{}' in participant {}", text, id);
                    }
                }
                FragmentItem::Pair { label, value } => {
                    let value = collapse_whitespace(value);
                    match self.resolve_label(label) {
                        Some(LabelTarget::Field(field)) => {
                            let cleaned = self.clean(field, &value);
                            if !cleaned.is_empty() {
                                participant.fields.entry(field).or_insert(cleaned);
                            }
                        }
                        Some(LabelTarget::Date) => {
                            if !value.is_empty() {
                                pending_date = Some(value);
                            }
                        }
                        Some(LabelTarget::Rounds) => match pending_date.take() {
                            Some(date) if participant.schedule.len() < self.max_slots => {
                                participant.schedule.push(ScheduleSlot {
                                    day: day.clone(),
                                    date,
                                    rounds: value,
                                });
                            }
                            Some(_) => {
                                log::debug!(
                                    "Participant {} has more than {} slots; dropping extra",
                                    id,
                                    self.max_slots
                                );
                            }
                            None => log::trace!("Rounds without date in participant {}", id),
                        },
                        None => log::trace!("Unmapped label '{}' in participant {}", label, id),
                    }
                }
            }
        }

        participant
    }

    fn clean(&self, field: Field, value: &str) -> String {
        match field {
            Field::Height => self
                .height_digits
                .captures(value)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| value.to_string()),
            Field::Dog => self.dog_prefix.replace(value, "").trim().to_string(),
            _ => value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer(max_slots: usize) -> Normalizer {
        Normalizer::new(&NormalizerConfig::default(), max_slots).unwrap()
    }

    #[test]
    fn multilingual_labels_map_to_same_field() {
        let n = normalizer(10);
        for label in ["Guía", "GUIA:", "Handler", "guide"] {
            assert_eq!(
                n.resolve_label(label),
                Some(LabelTarget::Field(Field::Handler)),
                "{label}"
            );
        }
        assert_eq!(
            n.resolve_label("Nombre del Perro"),
            Some(LabelTarget::Field(Field::Dog))
        );
        assert_eq!(n.resolve_label("Fecha"), Some(LabelTarget::Date));
        assert_eq!(n.resolve_label("Mangas"), Some(LabelTarget::Rounds));
    }

    #[test]
    fn every_configured_spelling_resolves_to_its_field() {
        let config = NormalizerConfig::default();
        let n = Normalizer::new(&config, 10).unwrap();
        for synonyms in &config.fields {
            let expected = Some(LabelTarget::Field(synonyms.field));
            assert_eq!(n.resolve_label(synonyms.field.as_str()), expected);
            for spelling in &synonyms.spellings {
                assert_eq!(n.resolve_label(spelling), expected, "{spelling}");
                assert_eq!(n.resolve_label(&spelling.to_uppercase()), expected, "{spelling}");
                assert_eq!(n.resolve_label(&format!("{spelling}:")), expected, "{spelling}");
            }
        }
    }

    #[test]
    fn grade_and_category_labels_do_not_open_slots() {
        let n = normalizer(10);
        assert_eq!(n.resolve_label("Grado"), None);
        assert_eq!(n.resolve_label("Categoría:"), None);

        let fragment = vec![
            FragmentItem::day("Sábado"),
            FragmentItem::pair("Fecha", "12/04/2025"),
            FragmentItem::pair("Grado", "G2"),
            FragmentItem::pair("Categoría", "M"),
            FragmentItem::pair("Mangas", "G2/M(J12)"),
        ];
        let p = n.normalize("p1", &fragment);
        assert_eq!(
            p.schedule,
            vec![ScheduleSlot {
                day: "Sábado".to_string(),
                date: "12/04/2025".to_string(),
                rounds: "G2/M(J12)".to_string(),
            }]
        );
    }

    #[test]
    fn bare_word_is_not_widened_to_multi_word_spelling() {
        let n = normalizer(10);
        assert_eq!(n.resolve_label("Nombre"), None);
        assert_eq!(
            n.resolve_label("Nombre de pedigrí completo"),
            Some(LabelTarget::Field(Field::PedigreeName))
        );
        assert_eq!(
            n.resolve_label("Fede"),
            Some(LabelTarget::Field(Field::Federation))
        );
    }

    #[test]
    fn containment_prefers_longest_spelling() {
        let n = normalizer(10);
        assert_eq!(
            n.resolve_label("Licencia RSCE"),
            Some(LabelTarget::Field(Field::License))
        );
        assert_eq!(
            n.resolve_label("Raza del perro (FCI)"),
            Some(LabelTarget::Field(Field::Breed))
        );
        assert_eq!(n.resolve_label("xx"), None);
        assert_eq!(n.resolve_label("Observaciones"), None);
    }

    #[test]
    fn first_occurrence_wins_and_values_are_cleaned() {
        let n = normalizer(10);
        let fragment = vec![
            FragmentItem::pair("Perro", "Mi Perro: Luna"),
            FragmentItem::pair("Dog", "Otra"),
            FragmentItem::pair("Altura", "  52 cm "),
            FragmentItem::pair("Club", ""),
            FragmentItem::pair("Club", "CD Canino"),
        ];
        let p = n.normalize("p1", &fragment);
        assert_eq!(p.get(Field::Dog), "Luna");
        assert_eq!(p.get(Field::Height), "52");
        assert_eq!(p.get(Field::Club), "CD Canino");
    }

    #[test]
    fn slots_pair_date_and_rounds_under_day_headers() {
        let n = normalizer(10);
        let fragment = vec![
            FragmentItem::day("Sábado"),
            FragmentItem::pair("Fecha", "12/04/2025"),
            FragmentItem::pair("Mangas", "G2 / M"),
            FragmentItem::day("Información adicional"),
            FragmentItem::day("Domingo"),
            FragmentItem::pair("Fecha", "13/04/2025"),
            FragmentItem::pair("Fecha", "14/04/2025"),
            FragmentItem::pair("Mangas", "G2 / M (J12)"),
            FragmentItem::pair("Mangas", "orphan"),
        ];
        let p = n.normalize("p1", &fragment);

        assert_eq!(p.schedule.len(), 2);
        assert_eq!(p.schedule[0].day, "Sábado");
        assert_eq!(p.schedule[0].rounds, "G2 / M");
        assert_eq!(p.schedule[1].day, "Domingo");
        assert_eq!(p.schedule[1].date, "14/04/2025");
    }

    #[test]
    fn recognized_header_discards_pending_date() {
        let n = normalizer(10);
        let fragment = vec![
            FragmentItem::pair("Fecha", "12/04/2025"),
            FragmentItem::day("Día 2"),
            FragmentItem::pair("Mangas", "G1"),
        ];
        assert!(n.normalize("p1", &fragment).schedule.is_empty());
    }

    #[test]
    fn slots_are_capped() {
        let n = normalizer(2);
        let fragment: Vec<FragmentItem> = (1..=4)
            .flat_map(|d| {
                [
                    FragmentItem::pair("Date", format!("0{d}/05/2025")),
                    FragmentItem::pair("Rounds", "G3/L"),
                ]
            })
            .collect();
        assert_eq!(n.normalize("p1", &fragment).schedule.len(), 2);
    }
}
